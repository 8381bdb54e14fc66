//! Export a project's recipe.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use seqmix_common::config::AppConfig;
use seqmix_export_engine::{ExportError, ExportEvent, ExportOrchestrator, ExportState};
use seqmix_image_store::FsImageStore;

pub async fn run(config: &mut AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let store = Arc::new(FsImageStore::new());
    let mut loaded = super::load_project(&path)?;
    super::probe_all(&mut loaded.project, store.as_ref());

    println!("Exporting project at: {}", path.display());
    println!("  Output: {}", loaded.project.export.output_dir.display());

    let mut orchestrator = ExportOrchestrator::new(store);
    let events = match orchestrator.start(&loaded.project) {
        Ok(events) => events,
        Err(ExportError::Blocked { issues, .. }) => {
            for issue in issues.iter().filter(|i| i.is_error()) {
                println!("  {issue}");
            }
            anyhow::bail!("Export blocked; run `seqmix validate` for details");
        }
        Err(e) => return Err(e.into()),
    };

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current frame...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    // The worker blocks on I/O; drain its queue off the async runtime.
    tokio::task::spawn_blocking(move || {
        for event in events {
            match event {
                ExportEvent::Progress(p) => {
                    print!(
                        "\r  Progress: {:.1}% ({}/{} frames)  ",
                        p.fraction * 100.0,
                        p.completed,
                        p.total
                    );
                    let _ = std::io::stdout().flush();
                }
                ExportEvent::Log(line) if line.level != seqmix_export_engine::LogLevel::Info => {
                    println!("\n  {line}");
                }
                _ => {}
            }
        }
    })
    .await?;

    let summary = orchestrator
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Export worker was not started"))?;
    println!();

    match summary.state {
        ExportState::Completed => {
            println!(
                "Export complete: {} written, {} skipped, {} dropped",
                summary.written.len(),
                summary.skipped.len(),
                summary.dropped.len()
            );
            for skipped in &summary.skipped {
                println!("  frame {}: {}", skipped.frame, skipped.reason);
            }
        }
        ExportState::Cancelled => {
            println!(
                "Export cancelled: {} frame(s) written and kept",
                summary.written.len()
            );
        }
        _ => {
            anyhow::bail!(
                "Export failed: {}",
                summary.failure.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    config.session.last_output_dir = Some(loaded.project.export.output_dir.clone());
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
    Ok(())
}
