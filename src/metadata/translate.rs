// src/metadata/translate.rs

//! Translation between stored metadata and flat label → value maps
//!
//! Forward translation turns a record's `ext` object into human-readable
//! columns (select values, breadcrumbs for term ids). Reverse translation
//! turns a flat row, as read from a spreadsheet, back into typed `ext`
//! payloads grouped per schema version id.

use crate::api::ApiClient;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use url::Url;

use super::cache::TaxonomyCache;
use super::schema::{FieldKind, Schema, SchemaField, USAGE_RIGHTS_SCHEMA};
use super::taxonomy::{TermMode, MULTI_PATH_SEPARATOR, PATH_SEPARATOR};

/// Output layout of date fields carrying a time component
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Output layout of date-only fields
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y"];

/// Fixed column labels of the Usage Rights schema, by field key
fn usage_rights_label(key: &str) -> Option<&'static str> {
    match key {
        "expiration" => Some("Expiration Date"),
        "title" => Some("License Type"),
        "description" => Some("Usage Rights Information"),
        _ => None,
    }
}

/// Ordered label → value map; inserting an existing label replaces its value in place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMetadata {
    entries: Vec<(String, Option<String>)>,
}

impl FlatMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: Option<String>) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    /// Value of a label; `None` when the label is absent or its value empty
    pub fn value(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(l, _)| l == label)
    }

    pub fn remove(&mut self, label: &str) -> Option<Option<String>> {
        let position = self.entries.iter().position(|(l, _)| l == label)?;
        Some(self.entries.remove(position).1)
    }

    /// Merge `other` over `self`, keeping first-seen label order
    pub fn extend(&mut self, other: FlatMetadata) {
        for (label, value) in other.entries {
            self.insert(label, value);
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(l, v)| (l.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Creates link objects for link fields
pub trait LinkRegistrar {
    /// Register `url` and return its `link:<id>` uid
    fn register(&mut self, url: &str) -> Result<String>;
}

/// Registers links through `POST /v3/links/`
pub struct ApiLinkRegistrar<'a> {
    client: &'a ApiClient,
}

impl<'a> ApiLinkRegistrar<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }
}

impl LinkRegistrar for ApiLinkRegistrar<'_> {
    fn register(&mut self, url: &str) -> Result<String> {
        let link = self.client.post("/v3/links/", &json!({ "url": url }))?;
        let id = match link.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Error::Decode(format!("link response has no id: {link}"))),
        };
        Ok(format!("link:{id}"))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_joined(value: &Value, separator: &str) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(separator),
        other => render_scalar(other),
    }
}

fn string_list(value: &Value) -> Vec<&str> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => vec![s.as_str()],
        _ => Vec::new(),
    }
}

/// Column label of a field
pub fn field_label(schema: &Schema, field: &SchemaField, with_schema_name: bool) -> String {
    if schema.name == USAGE_RIGHTS_SCHEMA {
        if let Some(label) = usage_rights_label(&field.key) {
            return label.to_string();
        }
    }
    if with_schema_name {
        format!("{}: {}", schema.name, field.label)
    } else {
        field.label.clone()
    }
}

/// Translate one stored record into flat columns
///
/// Every schema field yields a column; missing or empty values yield `None`.
pub fn translate_forward(
    client: &ApiClient,
    taxonomies: &mut TaxonomyCache,
    schema: &Schema,
    ext: &Map<String, Value>,
    with_schema_name: bool,
) -> Result<FlatMetadata> {
    let mut result = FlatMetadata::new();
    for field in &schema.fields {
        let label = field_label(schema, field, with_schema_name);
        let value = match ext.get(&field.key) {
            Some(v) if !is_blank(v) => v,
            _ => {
                result.insert(label, None);
                continue;
            }
        };

        let rendered = match field.kind {
            FieldKind::MultiSelect | FieldKind::StringArray => render_joined(value, PATH_SEPARATOR),
            FieldKind::Asset => render_joined(value, ","),
            FieldKind::Term | FieldKind::TermId => {
                let mut crumbs = Vec::new();
                for term_id in string_list(value) {
                    crumbs.push(taxonomies.full_path(client, term_id)?);
                }
                let separator = if field.kind == FieldKind::Term {
                    MULTI_PATH_SEPARATOR
                } else {
                    ","
                };
                crumbs.join(separator)
            }
            FieldKind::Text
            | FieldKind::Select
            | FieldKind::Date
            | FieldKind::Link
            | FieldKind::Other => render_scalar(value),
        };
        result.insert(label, (!rendered.is_empty()).then_some(rendered));
    }
    Ok(result)
}

fn parse_naive(input: &str) -> Option<NaiveDateTime> {
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt);
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a date in any of the accepted input layouts, as an instant
///
/// Inputs without an offset are taken as UTC.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_naive(input).map(|dt| dt.and_utc())
}

/// Parse a date keeping the wall-clock fields as written; an offset is dropped
pub fn parse_local_date(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_local());
    }
    parse_naive(input)
}

/// Settings for reverse translation
pub struct ReverseContext<'a> {
    pub taxonomies: &'a TaxonomyCache,
    pub links: &'a mut dyn LinkRegistrar,
    pub term_mode: TermMode,
}

fn option_values(field: &SchemaField, labels: &[&str]) -> Vec<Value> {
    labels
        .iter()
        .filter_map(|label| {
            let value = field.option_value(label).cloned();
            if value.is_none() {
                debug!("Dropping unknown option '{}' of {}", label, field.label);
            }
            value
        })
        .collect()
}

/// Translate one flat value into the stored shape of `field`
pub fn translate_field(field: &SchemaField, raw: &str, ctx: &mut ReverseContext<'_>) -> Result<Value> {
    let value = match field.kind {
        FieldKind::Select => field.option_value(raw).cloned().unwrap_or_else(|| {
            if !raw.is_empty() {
                warn!("Unknown option '{}' for {}, clearing", raw, field.label);
            }
            Value::Null
        }),
        FieldKind::MultiSelect => {
            let labels: Vec<&str> = raw.split(PATH_SEPARATOR).collect();
            Value::Array(option_values(field, &labels))
        }
        FieldKind::StringArray => Value::Array(
            raw.split(PATH_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        FieldKind::Asset => Value::Array(
            raw.split(',')
                .filter(|s| s.starts_with("asset:"))
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        FieldKind::Date => match parse_local_date(raw) {
            Some(dt) => {
                let format = if field.ext.include_time {
                    DATE_TIME_FORMAT
                } else {
                    DATE_FORMAT
                };
                Value::String(dt.format(format).to_string())
            }
            None => {
                warn!("Unparsable date '{}' for {}, clearing", raw, field.label);
                Value::Null
            }
        },
        FieldKind::Link => {
            let mut links = Vec::new();
            match Url::parse(raw) {
                Ok(url)
                    if matches!(url.scheme(), "http" | "https")
                        && url.host_str().is_some_and(|h| !h.is_empty()) =>
                {
                    links.push(Value::String(ctx.links.register(raw)?));
                }
                _ => warn!("Dropping invalid link '{}' for {}", raw, field.label),
            }
            Value::Array(links)
        }
        FieldKind::Term => {
            let root = field
                .taxonomy_root()
                .ok_or_else(|| Error::InvalidInput(format!("term field {} has no taxonomy", field.key)))?;
            let index = ctx
                .taxonomies
                .index(root)
                .ok_or_else(|| Error::NotFound(format!("taxonomy index for {root}")))?;
            let mut ids = Vec::new();
            if !raw.is_empty() {
                for crumb in raw.split(MULTI_PATH_SEPARATOR) {
                    let resolved = index.resolve(crumb, ctx.term_mode);
                    if resolved.is_empty() {
                        warn!("Dropping unknown term path '{}' for {}", crumb, field.label);
                    }
                    ids.extend(resolved.into_iter().map(Value::String));
                }
            }
            Value::Array(ids)
        }
        FieldKind::Text | FieldKind::TermId | FieldKind::Other => Value::String(raw.to_string()),
    };
    Ok(value)
}

/// Reverse-translate a flat row against a set of schemas
///
/// Labels are matched against field labels of `schemas`; a label defined by
/// several schemas belongs to the last one. Unmatched labels are ignored.
/// The result maps each schema's write id to the `ext` keys it receives.
pub fn translate_reverse(
    schemas: &[&Schema],
    flat: &BTreeMap<String, String>,
    ctx: &mut ReverseContext<'_>,
) -> Result<BTreeMap<String, Map<String, Value>>> {
    let mut field_for_label: HashMap<&str, (&Schema, &SchemaField)> = HashMap::new();
    for schema in schemas {
        for field in &schema.fields {
            field_for_label.insert(field.label.as_str(), (schema, field));
        }
    }

    let mut grouped: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for (label, raw) in flat {
        let Some((schema, field)) = field_for_label.get(label.as_str()) else {
            continue;
        };
        let value = translate_field(field, raw, ctx)?;
        grouped
            .entry(schema.write_id().to_string())
            .or_default()
            .insert(field.key.clone(), value);
    }
    Ok(grouped)
}
