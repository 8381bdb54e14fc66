//! Output attribute edits.

use std::path::PathBuf;

use seqmix_image_store::FsImageStore;
use seqmix_processing_core::probe_sequence;
use seqmix_project_model::{
    AttributeResolution, AttributeSpec, AttributeType, AttributeValue, ImportOutcome, Project,
};

use crate::{AttrKind, OnConflict};

pub fn import(
    path: PathBuf,
    sequence: String,
    names: Vec<String>,
    subimage: usize,
    on_conflict: OnConflict,
) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let seq = loaded
        .project
        .sequence_mut(&sequence)
        .ok_or_else(|| anyhow::anyhow!("Sequence '{sequence}' is not loaded"))?;
    probe_sequence(&FsImageStore::new(), seq)?;

    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let outcome = loaded
        .project
        .import_attributes(&sequence, subimage, &names)?;

    match outcome {
        ImportOutcome::Imported { added, unchanged } => {
            println!(
                "Imported {} attribute(s), {} already present",
                added.len(),
                unchanged.len()
            );
        }
        ImportOutcome::Conflicts(conflicts) => {
            let resolution = match on_conflict {
                OnConflict::Fail => {
                    println!("Conflicting attributes (nothing imported):");
                    for c in &conflicts {
                        println!(
                            "  {}: output has {}, source has {}",
                            c.name, c.existing.value, c.incoming.value
                        );
                    }
                    anyhow::bail!("Re-run with --on-conflict keep or --on-conflict replace");
                }
                OnConflict::Keep => AttributeResolution::KeepExisting,
                OnConflict::Replace => AttributeResolution::Replace,
            };
            for conflict in &conflicts {
                loaded
                    .project
                    .resolve_attribute_conflict(conflict, resolution)?;
            }

            let resolved: Vec<&str> = conflicts.iter().map(|c| c.name.as_str()).collect();
            let rest = selection_without(&loaded.project, &sequence, subimage, &names, &resolved);
            let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
            let added = if rest.is_empty() {
                0
            } else {
                match loaded.project.import_attributes(&sequence, subimage, &rest)? {
                    ImportOutcome::Imported { added, .. } => added.len(),
                    ImportOutcome::Conflicts(left) => {
                        anyhow::bail!("{} conflict(s) remain unresolved", left.len())
                    }
                }
            };
            println!(
                "Resolved {} conflict(s) ({:?}), imported {added} other attribute(s)",
                conflicts.len(),
                resolution
            );
        }
    }

    super::save_project(&loaded)?;
    Ok(())
}

/// The selected attribute names (all when `names` is empty) minus `skip`.
fn selection_without(
    project: &Project,
    sequence: &str,
    subimage: usize,
    names: &[&str],
    skip: &[&str],
) -> Vec<String> {
    let selected: Vec<&str> = if names.is_empty() {
        project
            .sequence(sequence)
            .and_then(|s| s.probe.as_ref())
            .and_then(|p| p.subimage(subimage))
            .map(|sub| sub.attributes.names())
            .unwrap_or_default()
    } else {
        names.to_vec()
    };
    selected
        .into_iter()
        .filter(|n| !skip.contains(n))
        .map(str::to_string)
        .collect()
}

pub fn set(path: PathBuf, name: String, value: String, kind: AttrKind) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let (type_tag, value) = match kind {
        AttrKind::Int => (
            AttributeType::Int,
            AttributeValue::Int(
                value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("'{value}' is not an integer"))?,
            ),
        ),
        AttrKind::Float => (
            AttributeType::Float,
            AttributeValue::Float(
                value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("'{value}' is not a number"))?,
            ),
        ),
        AttrKind::String => (AttributeType::String, AttributeValue::String(value)),
    };

    if loaded.project.export.output_attributes.contains(&name) {
        loaded
            .project
            .set_output_attribute_value(&name, value.clone())?;
        println!("Set {name} = {value}");
    } else {
        loaded
            .project
            .add_output_attribute(AttributeSpec::user(&name, type_tag, value.clone()))?;
        println!("Added {name} = {value}");
    }
    super::save_project(&loaded)?;
    Ok(())
}

pub fn remove(path: PathBuf, name: String) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    loaded.project.remove_output_attribute(&name)?;
    super::save_project(&loaded)?;
    println!("Removed attribute '{name}'");
    Ok(())
}
