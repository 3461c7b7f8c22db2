// src/export/campaign.rs

//! Campaign export driver
//!
//! Lists the campaigns of a license, formats their standard fields, merges
//! in their custom metadata and produces one table whose columns are the
//! union of every row's labels.

use crate::api::{collect_all, ApiClient, Query};
use crate::error::Result;
use crate::metadata::{parse_date, FlatMetadata, MetadataUpdater};
use crate::progress::ProgressTracker;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::csv_out::{export_file_name, write_table_to_path};
use super::format::{CampaignFormatter, CAMPAIGN_ID_HEADER, STANDARD_FIELDS, STANDARD_HEADERS};

/// Custom column duplicating the standard Topics column
pub const TOPICS_METADATA_LABEL: &str = "Topics: Topics";

/// One exported campaign: column label → value
pub type ExportRow = FlatMetadata;

/// Export result held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    /// Table with the standard headers and no rows
    pub fn empty() -> Self {
        Self {
            headers: STANDARD_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Cells of every row in header order
    pub fn cells(&self) -> impl Iterator<Item = Vec<Option<&str>>> {
        self.rows
            .iter()
            .map(|row| self.headers.iter().map(|h| row.value(h)).collect())
    }
}

/// Lower bound on `updated_at` of exported campaigns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    At(DateTime<Utc>),
    /// This many days before now
    Days(i64),
    /// A date string; unparsable strings mean "now"
    Text(String),
}

impl Since {
    /// Parse a command-line value: a day count or a date
    pub fn from_arg(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(days) => Since::Days(days),
            Err(_) => Since::Text(value.to_string()),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Since::At(at) => *at,
            Since::Days(days) => now - ChronoDuration::days(*days),
            Since::Text(text) => parse_date(text).unwrap_or_else(|| {
                warn!("Unparsable since '{}', exporting changes from now on", text);
                now
            }),
        }
    }
}

/// Listing options of an export
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub extend_scopes: bool,
    pub since: Option<Since>,
    /// Additional listing parameters; they override the defaults
    pub extra_params: Query,
}

impl ExportOptions {
    fn listing_query(&self, license_uid: &str) -> Query {
        let mut params: Query = vec![("scope_ids".to_string(), license_uid.to_string())];
        if self.extend_scopes {
            params.push(("extend_scopes".to_string(), "true".to_string()));
        }
        for (key, value) in &self.extra_params {
            params.retain(|(k, _)| k != key);
            params.push((key.clone(), value.clone()));
        }
        params
    }
}

/// Drives exports of campaigns
pub struct CampaignExport<'a> {
    client: &'a ApiClient,
}

impl<'a> CampaignExport<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    fn list_campaigns(&self, license_uid: &str, options: &ExportOptions) -> Result<Vec<Value>> {
        let mut campaigns = collect_all(self.client, "/v5/campaign/", &options.listing_query(license_uid))?;
        if let Some(since) = &options.since {
            let cutoff = since.cutoff(Utc::now());
            campaigns.retain(|campaign| {
                let updated = campaign
                    .get("updated_at")
                    .and_then(Value::as_str)
                    .and_then(parse_date);
                match updated {
                    Some(updated) => updated > cutoff,
                    None => {
                        warn!("Campaign {} has no usable updated_at, skipping", campaign["id"]);
                        false
                    }
                }
            });
        }
        Ok(campaigns)
    }

    /// Build the export table of one license
    pub fn build_table(
        &self,
        license_uid: &str,
        options: &ExportOptions,
        progress: &dyn ProgressTracker,
    ) -> Result<ExportTable> {
        let mut updater = MetadataUpdater::new(self.client, license_uid)?;
        let mut formatter = CampaignFormatter::new(
            self.client,
            updater.schemas().topics_schema_id().map(str::to_string),
        );

        let campaigns = self.list_campaigns(license_uid, options)?;
        info!("{} campaigns to export", campaigns.len());
        progress.set_length(campaigns.len() as u64);

        let mut table = ExportTable::empty();
        for campaign in &campaigns {
            let campaign_uid = campaign.get("id").and_then(Value::as_str).unwrap_or_default();
            let mut row = ExportRow::new();
            for field in STANDARD_FIELDS {
                let value = campaign.get(field.key).unwrap_or(&Value::Null);
                row.insert(field.header, formatter.format(field.kind, value, campaign_uid)?);
            }

            let mut custom = updater.get_custom_metadata(campaign_uid, true)?;
            custom.remove(TOPICS_METADATA_LABEL);
            for label in custom.labels() {
                if !table.headers.iter().any(|h| h == label) {
                    table.headers.push(label.to_string());
                }
            }
            row.extend(custom);

            table.rows.push(row);
            progress.increment(1);
        }

        table
            .rows
            .sort_by(|a, b| a.value(CAMPAIGN_ID_HEADER).cmp(&b.value(CAMPAIGN_ID_HEADER)));
        progress.finish_with_message(&format!("{} campaigns exported", table.rows.len()));
        Ok(table)
    }

    /// Export one license to `<out_dir>/<license>_campaign_export.csv`
    pub fn export_csv(
        &self,
        license_uid: &str,
        out_dir: &Path,
        options: &ExportOptions,
        progress: &dyn ProgressTracker,
    ) -> Result<(PathBuf, ExportTable)> {
        let table = self.build_table(license_uid, options, progress)?;
        let path = out_dir.join(export_file_name(license_uid));
        write_table_to_path(&table, &path)?;
        info!("Wrote {} rows to {}", table.rows.len(), path.display());
        Ok((path, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_since_cutoffs() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(
            Since::Days(3).cutoff(now),
            Utc.with_ymd_and_hms(2024, 6, 7, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Since::Text("2024-01-02".into()).cutoff(now),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(Since::Text("whenever".into()).cutoff(now), now);
        assert_eq!(Since::At(now).cutoff(now), now);
    }

    #[test]
    fn test_since_from_arg() {
        assert_eq!(Since::from_arg("7"), Since::Days(7));
        assert_eq!(Since::from_arg("2024-01-01"), Since::Text("2024-01-01".into()));
    }

    #[test]
    fn test_listing_query() {
        let options = ExportOptions {
            extend_scopes: true,
            since: None,
            extra_params: vec![
                ("statuses".to_string(), "active".to_string()),
                ("extend_scopes".to_string(), "false".to_string()),
            ],
        };
        let params = options.listing_query("license:1");
        assert_eq!(
            params,
            vec![
                ("scope_ids".to_string(), "license:1".to_string()),
                ("statuses".to_string(), "active".to_string()),
                ("extend_scopes".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_table_has_standard_headers() {
        let table = ExportTable::empty();
        assert_eq!(table.headers.len(), STANDARD_HEADERS.len());
        assert_eq!(table.headers[0], "Title");
        assert_eq!(table.cells().count(), 0);
    }
}
