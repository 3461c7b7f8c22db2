// src/commands/metadata.rs
//! Metadata commands: update from CSV, copy, merge and value listings

use anyhow::{bail, Context, Result};
use cms_export::config::Config;
use cms_export::export::read_flat_rows_from_path;
use cms_export::metadata::{MergePlan, MetadataUpdater, TermMode, UpdateOptions, UpdateOutcome};
use std::path::Path;
use tracing::{info, warn};

use super::open_client;

/// Update the metadata of every object listed in a CSV file
#[allow(clippy::too_many_arguments)]
pub fn cmd_update(
    config: &Config,
    api_key: Option<&str>,
    license_uid: &str,
    input: &Path,
    key_field: &str,
    standard: bool,
    custom: bool,
    tag_path_terms: bool,
) -> Result<()> {
    if !(standard || custom) {
        bail!("--no-standard and --no-custom leave nothing to update");
    }
    let rows = read_flat_rows_from_path(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    info!("Updating {} rows from {}", rows.len(), input.display());

    let client = open_client(config, api_key)?;
    let mut updater = MetadataUpdater::new(&client, license_uid)?;
    let options = UpdateOptions {
        standard,
        custom,
        term_mode: if tag_path_terms {
            TermMode::Path
        } else {
            TermMode::Leaf
        },
    };

    let mut updated = 0;
    let mut failed = Vec::new();
    for (line, row) in rows.iter().enumerate() {
        let Some(object_uid) = row.get(key_field).filter(|v| !v.is_empty()) else {
            warn!("Row {} has no value in '{}', skipping", line + 1, key_field);
            continue;
        };
        match updater.update(object_uid, row, options)? {
            UpdateOutcome::Updated => updated += 1,
            UpdateOutcome::Failed { reason } => failed.push((object_uid.clone(), reason)),
        }
    }

    println!("Updated {} objects", updated);
    if !failed.is_empty() {
        println!("Failed to update {} objects:", failed.len());
        for (object_uid, reason) in &failed {
            println!("  {}: {}", object_uid, reason);
        }
    }
    Ok(())
}

/// Copy one schema's record between objects
pub fn cmd_copy(
    config: &Config,
    api_key: Option<&str>,
    license_uid: &str,
    schema: &str,
    source: &str,
    target: &str,
) -> Result<()> {
    let client = open_client(config, api_key)?;
    let updater = MetadataUpdater::new(&client, license_uid)?;
    match updater.copy_metadata(schema, source, target)? {
        Some(record_id) => println!("Copied {} metadata to {} ({})", schema, target, record_id),
        None => println!("No metadata for schema {} on object {}", schema, source),
    }
    Ok(())
}

/// Merge one schema's term fields between objects
pub fn cmd_merge(
    config: &Config,
    api_key: Option<&str>,
    license_uid: &str,
    schema: &str,
    source: &str,
    target: &str,
    dry_run: bool,
) -> Result<()> {
    let client = open_client(config, api_key)?;
    let mut updater = MetadataUpdater::new(&client, license_uid)?;
    let verb = if dry_run { "Would" } else { "Did" };
    match updater.merge_metadata(schema, source, target, dry_run)? {
        MergePlan::NothingToMerge => {
            println!("No source metadata for {} {}", schema, source);
        }
        MergePlan::Create { payload } => {
            println!("{} POST {} to {}", verb, source, target);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        MergePlan::Update { record_id, payload } => {
            println!("{} PUT {} to {} ({})", verb, source, target, record_id);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

/// Print the breadcrumbs of every taxonomy referenced by the license's schemas
pub fn cmd_taxonomies(config: &Config, api_key: Option<&str>, license_uid: &str) -> Result<()> {
    let client = open_client(config, api_key)?;
    let updater = MetadataUpdater::new(&client, license_uid)?;
    for (name, breadcrumbs) in updater.taxonomy_listing() {
        println!("{}", name);
        for crumb in breadcrumbs {
            println!("\t{}", crumb);
        }
        println!();
    }
    Ok(())
}

/// Print every accepted value of term and select fields as JSON
pub fn cmd_values(config: &Config, api_key: Option<&str>, license_uid: &str) -> Result<()> {
    let client = open_client(config, api_key)?;
    let updater = MetadataUpdater::new(&client, license_uid)?;
    println!("{}", serde_json::to_string_pretty(&updater.all_possible_values())?);
    Ok(())
}
