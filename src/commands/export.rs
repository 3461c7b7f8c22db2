// src/commands/export.rs
//! Campaign export command

use anyhow::{Context, Result};
use chrono::Utc;
use cms_export::config::Config;
use cms_export::export::{CampaignExport, ExportOptions, Since, WarehouseLoader};
use cms_export::progress::{CliProgress, LogProgress, ProgressTracker};
use std::path::Path;
use tracing::info;

use super::open_client;

/// Export every license to CSV and, optionally, into the warehouse table
#[allow(clippy::too_many_arguments)]
pub fn cmd_export(
    config: &Config,
    api_key: Option<&str>,
    license_uids: &[String],
    out_directory: &Path,
    extend_scopes: bool,
    since: Option<&str>,
    params: Vec<(String, String)>,
    warehouse: Option<&Path>,
    progress_bar: bool,
) -> Result<()> {
    let client = open_client(config, api_key)?;
    let exporter = CampaignExport::new(&client);
    let options = ExportOptions {
        extend_scopes,
        since: since.map(Since::from_arg),
        extra_params: params,
    };
    std::fs::create_dir_all(out_directory)
        .with_context(|| format!("failed to create {}", out_directory.display()))?;

    let mut loader = match warehouse {
        Some(path) => Some(
            WarehouseLoader::open(path, config.warehouse.clone())
                .with_context(|| format!("failed to open warehouse {}", path.display()))?,
        ),
        None => None,
    };
    let run_timestamp = Utc::now();

    for license_uid in license_uids {
        info!("Exporting campaigns of {}", license_uid);
        let progress: Box<dyn ProgressTracker> = if progress_bar {
            Box::new(CliProgress::new(license_uid, 0))
        } else {
            Box::new(LogProgress::new("campaigns", config.progress_every))
        };

        let (path, table) = exporter
            .export_csv(license_uid, out_directory, &options, progress.as_ref())
            .with_context(|| format!("export of {license_uid} failed"))?;
        println!("{}: {} campaigns -> {}", license_uid, table.rows.len(), path.display());

        if let Some(loader) = loader.as_mut() {
            let summary = loader.load(&table, run_timestamp)?;
            println!(
                "  warehouse: {} campaigns, {} cells replaced, {} cells loaded",
                summary.records, summary.deleted, summary.inserted
            );
        }
    }

    println!("{} API calls", client.total_calls());
    Ok(())
}
