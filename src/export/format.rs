// src/export/format.rs

//! Formatting of standard campaign fields
//!
//! Each standard field has a format kind. Term and platform ids are
//! rendered as names through `NameCache`, which batches lookups of ids it
//! has not seen yet.

use crate::api::uid::object_type;
use crate::api::{collect_all, query, ApiClient};
use crate::error::Result;
use crate::metadata::{parse_local_date, PATH_SEPARATOR};
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// How a standard field is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Text,
    Terms,
    Topics,
    Date,
    Platforms,
    Budget,
}

/// A standard campaign field and its column header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardField {
    pub key: &'static str,
    pub header: &'static str,
    pub kind: FormatKind,
}

const fn field(key: &'static str, header: &'static str, kind: FormatKind) -> StandardField {
    StandardField { key, header, kind }
}

/// Standard campaign fields in formatting order
pub const STANDARD_FIELDS: &[StandardField] = &[
    field("id", CAMPAIGN_ID_HEADER, FormatKind::Text),
    field("title", "Title", FormatKind::Text),
    field("description", "Description", FormatKind::Text),
    field("term_ids", "Terms", FormatKind::Terms),
    field("topic_ids", "Topics", FormatKind::Topics),
    field("scope_id", "License ID", FormatKind::Text),
    field("start_at", "Start At", FormatKind::Date),
    field("end_at", "End At", FormatKind::Date),
    field("platform_ids", "Platforms", FormatKind::Platforms),
    field("budget", "Budget", FormatKind::Budget),
    field("thumbnail_asset_id", "Thumbnail Asset", FormatKind::Text),
    field("created_at", "Created At", FormatKind::Date),
    field("updated_at", "Updated At", FormatKind::Date),
    field("parent_id", "Parent Campaign ID", FormatKind::Text),
];

/// Header of the column rows are sorted by
pub const CAMPAIGN_ID_HEADER: &str = "Campaign ID";

/// Column order of the standard fields in the output
pub const STANDARD_HEADERS: &[&str] = &[
    "Title",
    "Description",
    "License ID",
    "Start At",
    "End At",
    "Platforms",
    "Budget",
    CAMPAIGN_ID_HEADER,
    "Parent Campaign ID",
    "Terms",
    "Topics",
    "Thumbnail Asset",
    "Created At",
    "Updated At",
];

/// Plain value as text; null and empty strings are absent
pub fn format_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Layout of timestamps given without an offset
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamp as ISO 8601, keeping the offset it was given in
///
/// Values without an offset are rendered without one.
pub fn format_date(value: &Value) -> Option<String> {
    let raw = value.as_str().filter(|s| !s.is_empty())?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    match parse_local_date(raw) {
        Some(dt) => Some(dt.format(NAIVE_TIMESTAMP_FORMAT).to_string()),
        None => {
            warn!("Unparsable date '{}', exporting as-is", raw);
            Some(raw.to_string())
        }
    }
}

/// Budget object as `$12.50` (USD) or `<amount> <currency>`
pub fn format_budget(value: &Value) -> Option<String> {
    let budget = value.as_object()?;
    let amount = budget.get("amount").unwrap_or(&Value::Null);
    let currency = budget.get("currency").and_then(Value::as_str).unwrap_or_default();

    if currency == "USD" {
        let numeric = match amount {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(numeric) = numeric {
            return Some(format!("${numeric:.2}"));
        }
    }
    let amount = match amount {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(format!("{amount} {currency}"))
}

fn string_ids(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Names of terms and platforms, cached per object type
#[derive(Debug, Default)]
pub struct NameCache {
    names: HashMap<String, HashMap<String, String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a name
    pub fn insert(&mut self, id: &str, name: impl Into<String>) {
        let kind = object_type(id).unwrap_or_default().to_string();
        self.names
            .entry(kind)
            .or_default()
            .insert(id.to_string(), name.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        let kind = object_type(id).unwrap_or_default();
        self.names.get(kind)?.get(id).map(String::as_str)
    }

    /// `|`-joined names of `ids`, looking up unknown ids in one listing call
    ///
    /// Ids the listing does not return render as empty names.
    pub fn names(&mut self, client: &ApiClient, path: &str, ids: &[&str]) -> Result<Option<String>> {
        if ids.is_empty() {
            return Ok(None);
        }

        let mut misses: Vec<&str> = ids.iter().copied().filter(|id| self.get(id).is_none()).collect();
        misses.sort_unstable();
        misses.dedup();
        if !misses.is_empty() {
            debug!("Looking up {} names at {}", misses.len(), path);
            let found = collect_all(client, path, &query(&[("ids", &misses.join(","))]))?;
            for item in found {
                if let (Some(id), Some(name)) = (
                    item.get("id").and_then(Value::as_str),
                    item.get("name").and_then(Value::as_str),
                ) {
                    self.insert(id, name);
                }
            }
        }

        let names: Vec<&str> = ids
            .iter()
            .map(|id| {
                self.get(id).unwrap_or_else(|| {
                    warn!("No name found for {}", id);
                    ""
                })
            })
            .collect();
        Ok(Some(names.join(PATH_SEPARATOR)))
    }
}

/// Formats standard fields of campaigns from one license
pub struct CampaignFormatter<'a> {
    client: &'a ApiClient,
    names: NameCache,
    topics_schema_id: Option<String>,
}

impl<'a> CampaignFormatter<'a> {
    pub fn new(client: &'a ApiClient, topics_schema_id: Option<String>) -> Self {
        Self {
            client,
            names: NameCache::new(),
            topics_schema_id,
        }
    }

    pub fn names_mut(&mut self) -> &mut NameCache {
        &mut self.names
    }

    fn topics(&mut self, campaign_uid: &str) -> Result<Option<String>> {
        let Some(schema_id) = self.topics_schema_id.as_deref() else {
            return Ok(None);
        };
        let records = collect_all(
            self.client,
            "/v5/metadata/",
            &query(&[("object_ids", campaign_uid), ("schema_id", schema_id)]),
        )?;
        let Some(record) = records.first() else {
            return Ok(None);
        };
        let topics = record.pointer("/ext/topics").cloned().unwrap_or(Value::Null);
        self.names.names(self.client, "/v5/term/", &string_ids(&topics))
    }

    /// Render one field of a campaign
    pub fn format(&mut self, kind: FormatKind, value: &Value, campaign_uid: &str) -> Result<Option<String>> {
        match kind {
            FormatKind::Text => Ok(format_text(value)),
            FormatKind::Date => Ok(format_date(value)),
            FormatKind::Budget => Ok(format_budget(value)),
            FormatKind::Terms => self.names.names(self.client, "/v5/term/", &string_ids(value)),
            FormatKind::Platforms => self
                .names
                .names(self.client, "/v5/platform/", &string_ids(value)),
            FormatKind::Topics => self.topics(campaign_uid),
        }
    }
}
