//! Library interface for udfpub CLI components

pub mod bigquery;
pub mod config;
pub mod dry_run;
pub mod storage;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;
use udfpub_core::{ObjectStore, PublishReport, Publisher, Registry, RunState, Warehouse};

use config::Settings;
use storage::ProgressStore;

/// Load the sources, stage libraries, publish `requested` and write the
/// JSON report; recorded failures come back as an error after the report is written.
pub fn publish(
    settings: &Settings,
    requested: &[String],
    warehouse: &mut dyn Warehouse,
    store: &mut dyn ObjectStore,
    report_path: Option<&Path>,
    show_progress: bool,
) -> Result<PublishReport> {
    info!("{}: {:?}", RunState::Scanning, settings.source_dirs);
    let registry =
        Registry::load(&settings.source_dirs).context("Failed to load UDF sources")?;
    info!("Loaded {} functions", registry.len());

    let mut publisher = Publisher::new(&registry, settings.options.clone());

    let mut progress = ProgressStore::new(store, show_progress);
    let staged = publisher.stage(&mut progress);
    progress.finish();
    staged.context("Failed to stage dependencies")?;

    publisher.publish_all(requested, warehouse)?;
    let report = publisher.report().clone();

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    Ok(report.into_result()?)
}
