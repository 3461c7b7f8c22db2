// src/metadata/mod.rs

//! Custom metadata: schemas, taxonomies and translation
//!
//! Schemas describe the typed custom fields attached to objects; taxonomy
//! terms are addressed by breadcrumb. The updater combines the caches and
//! the translator into get/update/copy/merge operations.

mod cache;
mod schema;
mod taxonomy;
mod translate;
mod updater;

pub use cache::{SchemaCache, TaxonomyCache};
pub use schema::{
    FieldExt, FieldKind, MetadataRecord, Schema, SchemaField, SchemaVersion, SelectOption,
    Taxonomy, Term, ASSET_METADATA_SCHEMA, TOPICS_SCHEMA_SLUG, USAGE_RIGHTS_SCHEMA,
};
pub use taxonomy::{TermMode, TermPath, TermPathIndex, MULTI_PATH_SEPARATOR, PATH_SEPARATOR};
pub use translate::{
    field_label, parse_date, parse_local_date, translate_field, translate_forward, translate_reverse,
    ApiLinkRegistrar, FlatMetadata, LinkRegistrar, ReverseContext, DATE_FORMAT, DATE_TIME_FORMAT,
};
pub use updater::{
    FlatInput, MergePlan, MetadataUpdater, UpdateOptions, UpdateOutcome, TAG_NAME_LIMIT,
    USAGE_RIGHTS_SWITCH,
};
