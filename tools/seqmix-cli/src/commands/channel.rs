//! Output channel edits.

use std::path::PathBuf;

use seqmix_project_model::ChannelFormat;

pub fn add(
    path: PathBuf,
    source: String,
    name: Option<String>,
    format: Option<String>,
) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let source = super::parse_source(&source)?;
    let name = name.unwrap_or_else(|| source.channel_name.clone());

    if loaded.project.sequence(&source.sequence_id).is_none() {
        tracing::warn!(sequence = %source.sequence_id, "Sequence is not loaded; channel will be reported as dangling");
    }

    let label = source.to_string();
    loaded.project.add_output_channel(source, &name)?;
    if let Some(format) = format {
        loaded
            .project
            .set_format_override(&name, Some(ChannelFormat::new(format)))?;
    }
    super::save_project(&loaded)?;

    println!("Added output channel '{name}' <- {label}");
    Ok(())
}

pub fn rename(path: PathBuf, from: String, to: String) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    loaded.project.rename_output_channel(&from, &to)?;
    super::save_project(&loaded)?;
    println!("Renamed '{from}' to '{to}'");
    Ok(())
}

pub fn remove(path: PathBuf, name: String) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let removed = loaded.project.remove_output_channel(&name)?;
    super::save_project(&loaded)?;
    println!("Removed '{}' <- {}", removed.output_name, removed.source);
    Ok(())
}

pub fn move_to(path: PathBuf, name: String, position: usize) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    loaded.project.move_output_channel(&name, position)?;
    super::save_project(&loaded)?;

    let order: Vec<&str> = loaded
        .project
        .export
        .output_channels
        .iter()
        .map(|c| c.output_name.as_str())
        .collect();
    println!("Channel order: {}", order.join(", "));
    Ok(())
}

pub fn set_format(path: PathBuf, name: String, format: Option<String>) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    loaded
        .project
        .set_format_override(&name, format.clone().map(ChannelFormat::new))?;
    super::save_project(&loaded)?;

    match format {
        Some(format) => println!("'{name}' will be written as {format}"),
        None => println!("'{name}' keeps its source format"),
    }
    Ok(())
}
