//! Validate a project's recipe.

use std::path::PathBuf;

use seqmix_image_store::{FsImageStore, ImageStore};
use seqmix_processing_core::{export_permitted, validate, ValidationContext};

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let store = FsImageStore::new();
    let mut loaded = super::load_project(&path)?;
    super::probe_all(&mut loaded.project, &store);

    let modes = store.supported_compression_modes();
    let formats = store.conversion_formats();
    let issues = validate(
        &ValidationContext::new(&loaded.project)
            .with_compression_modes(&modes)
            .with_conversion_formats(&formats),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else {
        println!("Validating {}", path.display());
        for issue in &issues {
            println!("  {issue}");
        }
    }

    if export_permitted(&issues) {
        if !json {
            println!("\nRecipe is ready to export ({} warning(s)).", issues.len());
        }
        Ok(())
    } else {
        let errors = issues.iter().filter(|i| i.is_error()).count();
        anyhow::bail!("{errors} error(s) block the export")
    }
}
