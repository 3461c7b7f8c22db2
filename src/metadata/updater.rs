// src/metadata/updater.rs

//! Reading and writing the metadata of an object
//!
//! `MetadataUpdater` owns the schema and taxonomy caches of one license and
//! drives the translator against `/v5/metadata/`. Writes touch only the
//! records whose schema receives new values.

use crate::api::uid::{object_type, supports_metadata};
use crate::api::{collect_all, query, ApiClient, Method, Query};
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::cache::{SchemaCache, TaxonomyCache};
use super::schema::{FieldKind, MetadataRecord};
use super::taxonomy::{TermMode, MULTI_PATH_SEPARATOR};
use super::translate::{
    translate_forward, translate_reverse, ApiLinkRegistrar, FlatMetadata, ReverseContext,
};

const METADATA_PATH: &str = "/v5/metadata/";

/// Maximum length of a tag name
pub const TAG_NAME_LIMIT: usize = 64;

/// Column switching the Usage Rights update on
pub const USAGE_RIGHTS_SWITCH: &str = "Add Usage Rights Information";

/// Usage Rights columns and the field keys they write
const USAGE_RIGHTS_COLUMNS: &[(&str, &str)] = &[
    ("License Type", "title"),
    ("Usage Rights Information", "description"),
    ("Expiration Date", "expiration"),
];

/// Fields of a stored record that are not carried over when copying
const RECORD_BOOKKEEPING_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Flat input row: column label → raw value
pub type FlatInput = BTreeMap<String, String>;

/// Which parts of an object's metadata an update writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Asset Metadata and Usage Rights (assets only)
    pub standard: bool,
    /// Custom schemas
    pub custom: bool,
    pub term_mode: TermMode,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            standard: true,
            custom: true,
            term_mode: TermMode::Leaf,
        }
    }
}

/// Result of updating one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Failed { reason: String },
}

/// What `merge_metadata` sends (or would send on a dry run)
#[derive(Debug, Clone, PartialEq)]
pub enum MergePlan {
    /// The source object has no record of the schema
    NothingToMerge,
    /// The target has no record yet; a copy of the source is created
    Create { payload: Value },
    /// The target record is updated with the union of both
    Update { record_id: String, payload: Value },
}

fn is_truthy(value: Option<&String>) -> bool {
    match value {
        Some(v) => !v.is_empty() && !matches!(v.as_str(), "No" | "no" | "NO" | "0"),
        None => false,
    }
}

fn column<'a>(flat: &'a FlatInput, name: &str) -> Result<&'a str> {
    flat.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidInput(format!("missing column '{name}'")))
}

fn data_array(mut body: Value) -> Vec<Value> {
    match body.get_mut("data").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn record_id(record: &Value) -> Result<String> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Decode(format!("metadata record has no id: {record}")))
}

/// Metadata reader/writer for one license
pub struct MetadataUpdater<'a> {
    client: &'a ApiClient,
    license_uid: String,
    schemas: SchemaCache,
    taxonomies: TaxonomyCache,
    tag_cache: HashMap<String, String>,
}

impl<'a> MetadataUpdater<'a> {
    /// Load the license's schemas, the system schemas and every referenced taxonomy
    pub fn new(client: &'a ApiClient, license_uid: &str) -> Result<Self> {
        let mut schemas = SchemaCache::new();
        schemas.load_scope(client, license_uid)?;
        schemas.load_system(client)?;
        let mut taxonomies = TaxonomyCache::new();
        taxonomies.setup(client, &schemas)?;
        Ok(Self::with_caches(client, license_uid, schemas, taxonomies))
    }

    /// Build an updater over prepared caches
    pub fn with_caches(
        client: &'a ApiClient,
        license_uid: &str,
        schemas: SchemaCache,
        taxonomies: TaxonomyCache,
    ) -> Self {
        Self {
            client,
            license_uid: license_uid.to_string(),
            schemas,
            taxonomies,
            tag_cache: HashMap::new(),
        }
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn taxonomies(&self) -> &TaxonomyCache {
        &self.taxonomies
    }

    fn records(&self, object_uid: &str) -> Result<Vec<MetadataRecord>> {
        let raw = collect_all(self.client, METADATA_PATH, &object_query(object_uid))?;
        serde_json::from_value(Value::Array(raw))
            .map_err(|e| Error::Decode(format!("invalid metadata records: {e}")))
    }

    /// Records of `object_uid` for one schema, unpaginated
    fn schema_records(&self, schema_id: &str, object_uid: &str) -> Result<Vec<Value>> {
        let params = query(&[("object_ids", object_uid), ("schema_id", schema_id)]);
        Ok(data_array(self.client.get(METADATA_PATH, &params)?))
    }

    /// Custom metadata of an object as flat columns, merged in record order
    pub fn get_custom_metadata(&mut self, object_uid: &str, with_schema_name: bool) -> Result<FlatMetadata> {
        let mut result = FlatMetadata::new();
        for record in self.records(object_uid)? {
            if self.schemas.is_system(&record.schema_id) {
                continue;
            }
            let flat = self.translate_custom_metadata(&record.schema_id, &record.ext, with_schema_name)?;
            result.extend(flat);
        }
        Ok(result)
    }

    /// Forward-translate one record's `ext`
    pub fn translate_custom_metadata(
        &mut self,
        schema_id: &str,
        ext: &Map<String, Value>,
        with_schema_name: bool,
    ) -> Result<FlatMetadata> {
        let schema = self.schemas.get(self.client, schema_id)?;
        translate_forward(self.client, &mut self.taxonomies, schema, ext, with_schema_name)
    }

    /// Reverse-translate a flat row against a single schema
    pub fn create_custom_metadata(
        &mut self,
        schema_id: &str,
        flat: &FlatInput,
        term_mode: TermMode,
    ) -> Result<Map<String, Value>> {
        let schema = self.schemas.get(self.client, schema_id)?;
        let mut links = ApiLinkRegistrar::new(self.client);
        let mut ctx = ReverseContext {
            taxonomies: &self.taxonomies,
            links: &mut links,
            term_mode,
        };
        let mut grouped = translate_reverse(&[schema], flat, &mut ctx)?;
        Ok(grouped.remove(schema.write_id()).unwrap_or_default())
    }

    /// Reverse-translate a flat row against every schema applicable to the object
    fn translate_for_object(
        &mut self,
        object_uid: &str,
        flat: &FlatInput,
        term_mode: TermMode,
    ) -> Result<BTreeMap<String, Map<String, Value>>> {
        let Some(resource_type) = object_type(object_uid).filter(|_| supports_metadata(object_uid)) else {
            warn!("Object type of {} does not carry metadata", object_uid);
            return Ok(BTreeMap::new());
        };
        let schemas = self.schemas.schemas_for_type(resource_type);
        let mut links = ApiLinkRegistrar::new(self.client);
        let mut ctx = ReverseContext {
            taxonomies: &self.taxonomies,
            links: &mut links,
            term_mode,
        };
        translate_reverse(&schemas, flat, &mut ctx)
    }

    /// Write custom metadata of an object
    ///
    /// Existing records whose schema receives values are updated with the new
    /// keys merged over their stored `ext`; schemas without a record get a new
    /// one. Records of other schemas are left alone.
    pub fn update_custom_metadata(
        &mut self,
        object_uid: &str,
        flat: &FlatInput,
        term_mode: TermMode,
    ) -> Result<()> {
        let mut updates = self.translate_for_object(object_uid, flat, term_mode)?;

        for record in self.records(object_uid)? {
            if self.schemas.is_system(&record.schema_id) {
                continue;
            }
            let Some(new_values) = updates.remove(&record.schema_id) else {
                continue;
            };
            let mut ext = record.ext;
            ext.extend(new_values);
            let payload = json!({
                "schema_id": record.schema_id,
                "object_id": object_uid,
                "ext": ext,
            });
            debug!("Updating metadata {} of {}", record.id, object_uid);
            self.client
                .put(&format!("{METADATA_PATH}{}", record.id), &payload)?;
        }

        for (schema_id, ext) in updates {
            let payload = json!({
                "schema_id": schema_id,
                "object_id": object_uid,
                "ext": ext,
            });
            debug!("Creating {} metadata for {}", schema_id, object_uid);
            self.client.post(METADATA_PATH, &payload)?;
        }
        Ok(())
    }

    /// Term ids for tag names, creating missing tags
    fn prepare_tags(&mut self, tags: &[&str]) -> Result<Vec<String>> {
        let mut term_ids = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.starts_with("term:") {
                term_ids.push(tag.to_string());
                continue;
            }
            let name: String = tag.chars().take(TAG_NAME_LIMIT).collect();
            if let Some(id) = self.tag_cache.get(&name) {
                term_ids.push(id.clone());
                continue;
            }
            let created = self.client.post(
                "/v5/term/",
                &json!({
                    "scope_id": self.license_uid,
                    "namespace": "tag",
                    "name": name,
                }),
            )?;
            let id = record_id(&created)?;
            debug!("Created tag '{}' as {}", name, id);
            self.tag_cache.insert(name, id.clone());
            term_ids.push(id);
        }
        Ok(term_ids)
    }

    fn upsert_system_record(
        &self,
        existing: &[MetadataRecord],
        schema_id: &str,
        payload: Value,
    ) -> Result<()> {
        match existing.iter().find(|r| r.schema_id == schema_id) {
            Some(record) => self
                .client
                .put(&format!("{METADATA_PATH}{}", record.id), &payload)
                .map(|_| ()),
            None => self.client.post(METADATA_PATH, &payload).map(|_| ()),
        }
    }

    /// Write Asset Metadata and, when requested by the row, Usage Rights
    pub fn update_standard_metadata(&mut self, object_uid: &str, flat: &FlatInput) -> Result<()> {
        let asset_schema = self
            .schemas
            .asset_schema_id()
            .ok_or_else(|| Error::NotFound("Asset Metadata schema".to_string()))?
            .to_string();
        let existing = self.records(object_uid)?;

        let tags: Vec<&str> = column(flat, "Tags")?
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        let tag_ids = self.prepare_tags(&tags)?;
        let asset_payload = json!({
            "schema_id": asset_schema,
            "object_id": object_uid,
            "ext": {
                "title": column(flat, "Title")?,
                "description": column(flat, "Description")?,
                "tags": tag_ids,
            }
        });
        self.upsert_system_record(&existing, &asset_schema, asset_payload)?;

        if !is_truthy(flat.get(USAGE_RIGHTS_SWITCH)) {
            return Ok(());
        }
        let usage_schema = self
            .schemas
            .usage_schema_id()
            .ok_or_else(|| Error::NotFound("Usage Rights schema".to_string()))?
            .to_string();
        let mut ext = Map::new();
        for (label, key) in USAGE_RIGHTS_COLUMNS {
            ext.insert(key.to_string(), Value::String(column(flat, label)?.to_string()));
        }
        let usage_payload = json!({
            "schema_id": usage_schema,
            "object_id": object_uid,
            "ext": ext,
        });
        self.upsert_system_record(&existing, &usage_schema, usage_payload)
    }

    /// Update one object; failures are logged and reported in the outcome
    pub fn update(
        &mut self,
        object_uid: &str,
        flat: &FlatInput,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        if !(options.standard || options.custom) {
            return Err(Error::InvalidInput(
                "an update must write standard and/or custom metadata".to_string(),
            ));
        }

        Ok(match self.apply_update(object_uid, flat, options) {
            Ok(()) => UpdateOutcome::Updated,
            Err(e) => {
                warn!("Updating {} failed: {}", object_uid, e);
                UpdateOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        })
    }

    fn apply_update(&mut self, object_uid: &str, flat: &FlatInput, options: UpdateOptions) -> Result<()> {
        if options.standard && object_uid.starts_with("asset:") {
            self.update_standard_metadata(object_uid, flat)?;
        }
        if options.custom {
            self.update_custom_metadata(object_uid, flat, options.term_mode)?;
        }
        Ok(())
    }

    /// Source record of `schema_id` prepared for writing onto `target_uid`
    fn carried_record(&self, schema_id: &str, source_uid: &str, target_uid: &str) -> Result<Option<Value>> {
        let Some(mut record) = self.schema_records(schema_id, source_uid)?.into_iter().next() else {
            info!("No {} metadata on {}", schema_id, source_uid);
            return Ok(None);
        };
        if let Some(fields) = record.as_object_mut() {
            for field in RECORD_BOOKKEEPING_FIELDS {
                fields.remove(*field);
            }
            fields.insert("object_id".to_string(), Value::String(target_uid.to_string()));
        }
        Ok(Some(record))
    }

    /// Copy the record of one schema from `source_uid` onto `target_uid`
    ///
    /// Returns the target record id, or `None` when the source has no record.
    pub fn copy_metadata(&self, schema_id: &str, source_uid: &str, target_uid: &str) -> Result<Option<String>> {
        let Some(payload) = self.carried_record(schema_id, source_uid, target_uid)? else {
            return Ok(None);
        };
        match self.schema_records(schema_id, target_uid)?.first() {
            Some(existing) => {
                let id = record_id(existing)?;
                self.client.put(&format!("{METADATA_PATH}{id}"), &payload)?;
                Ok(Some(id))
            }
            None => {
                let created = self.client.post(METADATA_PATH, &payload)?;
                Ok(Some(record_id(&created)?))
            }
        }
    }

    /// Merge the record of one schema from `source_uid` into `target_uid`
    ///
    /// Unlimited term fields receive the union of both objects' terms, target
    /// terms first. On a dry run the plan is returned without being sent.
    pub fn merge_metadata(
        &mut self,
        schema_id: &str,
        source_uid: &str,
        target_uid: &str,
        dry_run: bool,
    ) -> Result<MergePlan> {
        let Some(source) = self.carried_record(schema_id, source_uid, target_uid)? else {
            return Ok(MergePlan::NothingToMerge);
        };

        let Some(existing) = self.schema_records(schema_id, target_uid)?.into_iter().next() else {
            if !dry_run {
                self.client.post(METADATA_PATH, &source)?;
            }
            return Ok(MergePlan::Create { payload: source });
        };

        let record_id = record_id(&existing)?;
        let mut ext = existing
            .get("ext")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let adding = source.get("ext").and_then(Value::as_object).cloned().unwrap_or_default();

        let schema = self.schemas.get(self.client, schema_id)?;
        for field in schema
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Term && f.ext.limit.is_none())
        {
            let mut merged: Vec<Value> = ext
                .get(&field.key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for term in adding.get(&field.key).and_then(Value::as_array).into_iter().flatten() {
                if !merged.contains(term) {
                    merged.push(term.clone());
                }
            }
            ext.insert(field.key.clone(), Value::Array(merged));
        }

        let payload = json!({
            "object_id": target_uid,
            "schema_id": schema_id,
            "ext": ext,
        });
        if dry_run {
            info!(
                "Dry run: would {} {}{} with {}",
                Method::Put,
                METADATA_PATH,
                record_id,
                payload
            );
        } else {
            self.client
                .put(&format!("{METADATA_PATH}{record_id}"), &payload)?;
        }
        Ok(MergePlan::Update { record_id, payload })
    }

    /// Every accepted value of term and select fields, `||`-joined per label
    pub fn all_possible_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        for field in self.schemas.schemas().iter().flat_map(|s| s.fields.iter()) {
            match field.kind {
                FieldKind::Term => {
                    let Some(index) = field.taxonomy_root().and_then(|r| self.taxonomies.index(r)) else {
                        warn!("No taxonomy indexed for {}", field.label);
                        continue;
                    };
                    values.insert(
                        field.label.clone(),
                        index.selectable_breadcrumbs().join(MULTI_PATH_SEPARATOR),
                    );
                }
                FieldKind::Select | FieldKind::MultiSelect => {
                    let labels: Vec<&str> = field.ext.values.iter().map(|o| o.label.as_str()).collect();
                    values.insert(field.label.clone(), labels.join(MULTI_PATH_SEPARATOR));
                }
                _ => {}
            }
        }
        values
    }

    /// Sorted breadcrumbs per taxonomy name
    pub fn taxonomy_listing(&self) -> BTreeMap<String, Vec<String>> {
        self.taxonomies
            .indexes()
            .map(|(name, index)| {
                (
                    name.to_string(),
                    index.breadcrumbs().map(str::to_string).collect(),
                )
            })
            .collect()
    }
}

/// Query selecting every record of an object
fn object_query(object_uid: &str) -> Query {
    query(&[("object_ids", object_uid)])
}
