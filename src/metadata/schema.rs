// src/metadata/schema.rs

//! Typed model of custom metadata schemas
//!
//! The API describes every custom field with a string type tag and a
//! free-form `ext` object. Both are decoded into closed Rust types here so
//! translation can match exhaustively on `FieldKind`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the system schema holding title/description/tags
pub const ASSET_METADATA_SCHEMA: &str = "Asset Metadata";

/// Name of the system schema holding usage rights
pub const USAGE_RIGHTS_SCHEMA: &str = "Usage Rights";

/// Slug of the per-license schema holding campaign topics
pub const TOPICS_SCHEMA_SLUG: &str = "topics";

/// Type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    Select,
    MultiSelect,
    StringArray,
    Date,
    Link,
    Term,
    #[serde(rename = "term_id")]
    TermId,
    Asset,
    /// Any tag this crate does not interpret; values pass through untouched
    Other,
}

impl FieldKind {
    /// Map a wire type tag to a kind
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" | "string" | "textarea" => FieldKind::Text,
            "select" => FieldKind::Select,
            "multi-select" => FieldKind::MultiSelect,
            "string-array" => FieldKind::StringArray,
            "date" => FieldKind::Date,
            "link" => FieldKind::Link,
            "term" => FieldKind::Term,
            "term_id" => FieldKind::TermId,
            "asset" => FieldKind::Asset,
            _ => FieldKind::Other,
        }
    }
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(FieldKind::from_tag(&tag))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FieldKind::Text => "text",
            FieldKind::Select => "select",
            FieldKind::MultiSelect => "multi-select",
            FieldKind::StringArray => "string-array",
            FieldKind::Date => "date",
            FieldKind::Link => "link",
            FieldKind::Term => "term",
            FieldKind::TermId => "term_id",
            FieldKind::Asset => "asset",
            FieldKind::Other => "other",
        };
        write!(f, "{tag}")
    }
}

/// One option of a select / multi-select field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

/// Type-specific field settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldExt {
    /// Options of select / multi-select fields
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<SelectOption>,

    /// Taxonomy roots a term field draws from
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_term_ids: Vec<String>,

    /// Whether a date field carries a time component
    #[serde(default, deserialize_with = "null_as_default")]
    pub include_time: bool,

    /// Maximum number of values (`None` = unlimited)
    #[serde(default)]
    pub limit: Option<u64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A custom field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ext: FieldExt,
}

impl SchemaField {
    /// Value stored for an option label
    pub fn option_value(&self, label: &str) -> Option<&Value> {
        self.ext
            .values
            .iter()
            .find(|o| o.label == label)
            .map(|o| &o.value)
    }

    /// First taxonomy root of a term field
    pub fn taxonomy_root(&self) -> Option<&str> {
        self.ext.parent_term_ids.first().map(String::as_str)
    }
}

/// Version reference of a schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version_id: String,
}

/// A metadata schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub version: SchemaVersion,
    #[serde(default, deserialize_with = "null_as_default")]
    pub limit_resource_types: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<SchemaField>,
}

impl Schema {
    /// Id used when writing metadata records; the version id when known
    pub fn write_id(&self) -> &str {
        if self.version.version_id.is_empty() {
            &self.id
        } else {
            &self.version.version_id
        }
    }

    /// Whether this schema applies to objects of `resource_type`
    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.limit_resource_types.iter().any(|t| t == resource_type)
    }

    /// Field with the given key
    pub fn field(&self, key: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// A taxonomy (tree of terms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub root_id: String,
    #[serde(default)]
    pub max_depth: u32,
}

/// A taxonomy term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Ancestor ids from the taxonomy root down to the parent
    #[serde(default, deserialize_with = "null_as_default")]
    pub path_ids: Vec<String>,
    #[serde(default)]
    pub taxonomy_id: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
}

/// A stored metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub schema_id: String,
    pub object_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ext: serde_json::Map<String, Value>,
}
