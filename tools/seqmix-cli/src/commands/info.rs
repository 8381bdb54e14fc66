//! Show project information.

use std::path::PathBuf;

use seqmix_image_store::FsImageStore;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    super::probe_all(&mut loaded.project, &FsImageStore::new());
    let p = &loaded.project;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!();

    println!("Sequences:");
    if p.sequences.is_empty() {
        println!("  (none)");
    }
    for seq in &p.sequences {
        println!(
            "  {}  {}/{}  {} frame(s)",
            seq.id,
            seq.source_dir.display(),
            seq.pattern,
            seq.frames().len()
        );
        let Some(probe) = &seq.probe else {
            println!("    (not probed)");
            continue;
        };
        for (index, sub) in probe.subimages.iter().enumerate() {
            println!("    subimage {index} ({})", sub.geometry);
            for channel in &sub.channels {
                println!("      {} {}", channel.name, channel.format);
            }
            for attr in sub.attributes.iter() {
                let lock = if attr.editable { "" } else { " (read-only)" };
                println!("      @{} {} = {}{lock}", attr.name, attr.type_tag, attr.value);
            }
        }
    }
    println!();

    println!("Output channels:");
    if p.export.output_channels.is_empty() {
        println!("  (none)");
    }
    for channel in &p.export.output_channels {
        match &channel.override_format {
            Some(format) => println!("  {} <- {} as {format}", channel.output_name, channel.source),
            None => println!("  {} <- {}", channel.output_name, channel.source),
        }
    }
    println!();

    println!("Output attributes:");
    if p.export.output_attributes.is_empty() {
        println!("  (none)");
    }
    for attr in p.export.output_attributes.iter() {
        println!("  {} {} = {}", attr.name, attr.type_tag, attr.value);
    }
    println!();

    let export = &p.export;
    println!("Export:");
    println!("  Directory: {}", export.output_dir.display());
    println!("  Pattern: {}", export.filename_pattern);
    println!(
        "  Frame policy: {}",
        export
            .frame_policy
            .map(|f| f.to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    if let Some(mode) = export.alignment {
        println!("  Alignment: {mode}");
    }
    if let Some(range) = export.frame_range {
        println!("  Frames: {}-{}", range.start, range.end);
    }
    println!(
        "  Compression: {}",
        export.compression.as_deref().unwrap_or("(default)")
    );
    println!("  Compression policy: {}", export.compression_policy);

    Ok(())
}
