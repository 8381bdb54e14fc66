//! Create a new seqmix project file.

use std::path::PathBuf;

use seqmix_common::config::AppConfig;
use seqmix_project_model::{FrameRangePolicy, LoadedProject};

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    name: Option<String>,
    pattern: String,
) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    let name = name.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string()
    });

    let mut project = LoadedProject::create(&path, &name)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    // Restore remembered defaults.
    let session = &config.session;
    let export = &mut project.project.export;
    export.filename_pattern = pattern;
    export.compression = session.compression.clone();
    if let Some(dir) = &session.last_output_dir {
        export.output_dir = dir.clone();
    }
    if let Some(policy) = &session.frame_policy {
        match policy.parse::<FrameRangePolicy>() {
            Ok(policy) => export.frame_policy = Some(policy),
            Err(e) => tracing::warn!(error = %e, "Ignoring remembered frame policy"),
        }
    }
    super::save_project(&project)?;

    println!("Project '{}' created at {}", name, path.display());
    println!("  ID: {}", project.project.id);
    println!("  Output pattern: {}", export_summary(&project));
    Ok(())
}

fn export_summary(project: &LoadedProject) -> String {
    let export = &project.project.export;
    match export.frame_policy {
        Some(policy) => format!("{} ({policy})", export.filename_pattern),
        None => format!("{} (no frame policy yet)", export.filename_pattern),
    }
}
