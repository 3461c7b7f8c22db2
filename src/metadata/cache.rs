// src/metadata/cache.rs

//! Schema and taxonomy caches
//!
//! Both caches are plain owned objects: they are filled lazily during a run
//! and never invalidated. A process that outlives a taxonomy change must
//! build fresh caches. Tests can seed them directly through `insert*`.

use crate::api::{collect_all, query, ApiClient, Query};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use super::schema::{
    Schema, SchemaField, Taxonomy, Term, FieldKind, ASSET_METADATA_SCHEMA, TOPICS_SCHEMA_SLUG,
    USAGE_RIGHTS_SCHEMA,
};
use super::taxonomy::{TermPathIndex, PATH_SEPARATOR};

/// Scope holding the built-in system schemas
const SYSTEM_SCOPE: &str = "builtin_scope:system";

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(format!("invalid {what}: {e}")))
}

fn data_of(mut body: Value) -> Value {
    body.get_mut("data").map(Value::take).unwrap_or(Value::Null)
}

/// Custom and system schemas of a license
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: Vec<Schema>,
    /// Schema id and version id → position in `schemas`
    aliases: HashMap<String, usize>,
    topics_schema_id: Option<String>,
    asset_schema_id: Option<String>,
    usage_schema_id: Option<String>,
    system: Vec<Schema>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a custom schema; returns its position
    pub fn insert(&mut self, schema: Schema) -> usize {
        if schema.slug == TOPICS_SCHEMA_SLUG {
            self.topics_schema_id = Some(schema.id.clone());
        }
        let position = match self.aliases.get(&schema.id) {
            Some(&pos) => {
                self.schemas[pos] = schema;
                pos
            }
            None => {
                self.schemas.push(schema);
                self.schemas.len() - 1
            }
        };
        let schema = &self.schemas[position];
        self.aliases.insert(schema.id.clone(), position);
        if !schema.version.version_id.is_empty() {
            self.aliases
                .insert(schema.version.version_id.clone(), position);
        }
        position
    }

    /// Register the system schemas (Asset Metadata, Usage Rights)
    pub fn insert_system(&mut self, asset: Schema, usage: Schema) {
        self.asset_schema_id = Some(asset.write_id().to_string());
        self.usage_schema_id = Some(usage.write_id().to_string());
        self.system = vec![asset, usage];
    }

    /// Load every active metadata schema of a license scope
    pub fn load_scope(&mut self, client: &ApiClient, scope: &str) -> Result<()> {
        let params = query(&[
            ("scope_ids", scope),
            ("statuses", "active"),
            ("type", "metadata"),
        ]);
        // The schema listing does not paginate
        let body = client.get("/v5/schema/", &params)?;
        let schemas: Vec<Schema> = decode(data_of(body), "schema listing")?;
        info!("Loaded {} metadata schemas for {}", schemas.len(), scope);
        for schema in schemas {
            self.insert(schema);
        }
        Ok(())
    }

    /// Locate the Asset Metadata and Usage Rights system schemas
    pub fn load_system(&mut self, client: &ApiClient) -> Result<()> {
        let params = query(&[
            ("scope_ids", SYSTEM_SCOPE),
            ("statuses", "active"),
            ("type", "metadata"),
            ("resource_types", "asset"),
        ]);
        let body = client.get("/v5/schema/", &params)?;
        let schemas: Vec<Schema> = decode(data_of(body), "system schema listing")?;

        let find = |name: &str| {
            schemas
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("system schema '{name}'")))
        };
        let asset = find(ASSET_METADATA_SCHEMA)?;
        let usage = find(USAGE_RIGHTS_SCHEMA)?;
        debug!(
            "System schemas: asset={} usage={}",
            asset.write_id(),
            usage.write_id()
        );
        self.insert_system(asset, usage);
        Ok(())
    }

    /// Schema by id or version id, fetching it when not cached
    pub fn get(&mut self, client: &ApiClient, schema_id: &str) -> Result<&Schema> {
        if !self.aliases.contains_key(schema_id) {
            debug!("Fetching schema {}", schema_id);
            let body = client.get(&format!("/v5/schema/{schema_id}"), &Query::new())?;
            let schema: Schema = decode(data_of(body), "schema")?;
            let position = self.insert(schema);
            self.aliases.entry(schema_id.to_string()).or_insert(position);
        }
        let position = self.aliases[schema_id];
        Ok(&self.schemas[position])
    }

    /// Cached schema by id or version id
    pub fn lookup(&self, schema_id: &str) -> Option<&Schema> {
        self.aliases.get(schema_id).map(|&pos| &self.schemas[pos])
    }

    /// Every cached custom schema, in load order
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Custom schemas applicable to a resource type
    pub fn schemas_for_type(&self, resource_type: &str) -> Vec<&Schema> {
        self.schemas
            .iter()
            .filter(|s| s.applies_to(resource_type))
            .collect()
    }

    /// Every term field across cached schemas
    pub fn term_fields(&self) -> Vec<&SchemaField> {
        self.schemas
            .iter()
            .flat_map(|s| s.fields.iter())
            .filter(|f| f.kind == FieldKind::Term)
            .collect()
    }

    /// Whether a record schema id is one of the system schemas
    pub fn is_system(&self, schema_id: &str) -> bool {
        self.asset_schema_id.as_deref() == Some(schema_id)
            || self.usage_schema_id.as_deref() == Some(schema_id)
    }

    pub fn topics_schema_id(&self) -> Option<&str> {
        self.topics_schema_id.as_deref()
    }

    pub fn asset_schema_id(&self) -> Option<&str> {
        self.asset_schema_id.as_deref()
    }

    pub fn usage_schema_id(&self) -> Option<&str> {
        self.usage_schema_id.as_deref()
    }
}

/// Taxonomy indexes and term name lookups
#[derive(Debug, Default)]
pub struct TaxonomyCache {
    indexes: BTreeMap<String, TermPathIndex>,
    /// Taxonomy name per root term id
    names: BTreeMap<String, String>,
    name_for_term: HashMap<String, String>,
    full_path_for_term: HashMap<String, String>,
}

impl TaxonomyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prebuilt index
    pub fn insert_index(&mut self, index: TermPathIndex, taxonomy_name: impl Into<String>) {
        self.names
            .insert(index.root_id().to_string(), taxonomy_name.into());
        self.indexes.insert(index.root_id().to_string(), index);
    }

    /// Seed the breadcrumb of a term
    pub fn insert_full_path(&mut self, term_id: impl Into<String>, breadcrumb: impl Into<String>) {
        self.full_path_for_term
            .insert(term_id.into(), breadcrumb.into());
    }

    /// Index of a taxonomy root
    pub fn index(&self, root_id: &str) -> Option<&TermPathIndex> {
        self.indexes.get(root_id)
    }

    /// Every index with its taxonomy name
    pub fn indexes(&self) -> impl Iterator<Item = (&str, &TermPathIndex)> {
        self.indexes.iter().map(|(root, index)| {
            let name = self.names.get(root).map(String::as_str).unwrap_or(root);
            (name, index)
        })
    }

    /// Build indexes for every taxonomy referenced by a term field of the cached schemas
    pub fn setup(&mut self, client: &ApiClient, schemas: &SchemaCache) -> Result<()> {
        let roots: BTreeSet<String> = schemas
            .term_fields()
            .iter()
            .flat_map(|f| f.ext.parent_term_ids.iter().cloned())
            .collect();
        if roots.is_empty() {
            return Ok(());
        }

        let taxonomies = self.fetch_taxonomies(client, &roots)?;
        for taxonomy in taxonomies.into_iter().filter(|t| roots.contains(&t.root_id)) {
            self.build_index(client, &taxonomy.root_id, taxonomy.max_depth)?;
            self.names.insert(taxonomy.root_id.clone(), taxonomy.name);
        }
        info!("Indexed {} taxonomies", self.indexes.len());
        Ok(())
    }

    fn fetch_taxonomies(&self, client: &ApiClient, roots: &BTreeSet<String>) -> Result<Vec<Taxonomy>> {
        let ids = roots.iter().cloned().collect::<Vec<_>>().join(",");
        let root_terms: Vec<Term> = decode(
            Value::Array(collect_all(client, "/v5/term/", &query(&[("ids", &ids)]))?),
            "root terms",
        )?;
        let taxonomy_ids: BTreeSet<String> =
            root_terms.into_iter().filter_map(|t| t.taxonomy_id).collect();
        if taxonomy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = taxonomy_ids.into_iter().collect::<Vec<_>>().join(",");
        // The taxonomy listing does not paginate
        let body = client.get("/v5/taxonomy/", &query(&[("ids", &ids)]))?;
        decode(data_of(body), "taxonomy listing")
    }

    /// Walk a taxonomy below `root_id` and index its breadcrumbs
    pub fn build_index(
        &mut self,
        client: &ApiClient,
        root_id: &str,
        max_depth: u32,
    ) -> Result<&TermPathIndex> {
        let depth = max_depth.to_string();
        let params = query(&[
            ("mode", "taxonomy"),
            ("parent_ids", root_id),
            ("depth", &depth),
        ]);
        let nodes: Vec<Term> = decode(
            Value::Array(collect_all(client, "/v5/term/", &params)?),
            "taxonomy terms",
        )?;
        let index = TermPathIndex::from_terms(root_id, &nodes);
        debug!("Taxonomy {} has {} breadcrumbs", root_id, index.len());
        self.indexes.insert(root_id.to_string(), index);
        Ok(&self.indexes[root_id])
    }

    /// Name and ancestors (root excluded) of a term; blank when the API rejects the lookup
    fn lookup_term(client: &ApiClient, term_id: &str) -> Result<(String, Vec<String>)> {
        match client.get(&format!("/v5/term/{term_id}"), &Query::new()) {
            Ok(body) => {
                let term: Term = decode(data_of(body), "term")?;
                Ok((term.name, term.path_ids.into_iter().skip(1).collect()))
            }
            Err(Error::Api { status, .. }) => {
                warn!("Term {} could not be resolved (status {:?}), leaving blank", term_id, status);
                Ok((String::new(), Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    fn term_name(&mut self, client: &ApiClient, term_id: &str) -> Result<String> {
        if let Some(name) = self.name_for_term.get(term_id) {
            return Ok(name.clone());
        }
        let (name, _) = Self::lookup_term(client, term_id)?;
        self.name_for_term.insert(term_id.to_string(), name.clone());
        Ok(name)
    }

    /// Breadcrumb of a term, resolving ancestor names once per term
    pub fn full_path(&mut self, client: &ApiClient, term_id: &str) -> Result<String> {
        if let Some(path) = self.full_path_for_term.get(term_id) {
            return Ok(path.clone());
        }

        let (name, ancestors) = Self::lookup_term(client, term_id)?;
        self.name_for_term.insert(term_id.to_string(), name);

        let mut parts = Vec::with_capacity(ancestors.len() + 1);
        for ancestor in ancestors.iter().chain(std::iter::once(&term_id.to_string())) {
            parts.push(self.term_name(client, ancestor)?);
        }
        let breadcrumb = parts.join(PATH_SEPARATOR);
        self.full_path_for_term
            .insert(term_id.to_string(), breadcrumb.clone());
        Ok(breadcrumb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockTransport, RecordingSleeper};
    use crate::api::Method;
    use crate::config::Config;
    use serde_json::json;

    fn client(mock: &MockTransport) -> ApiClient {
        let config = Config {
            base_url: "https://cms.test/api".to_string(),
            ..Config::default()
        };
        ApiClient::with_transport(
            &config,
            "key",
            Box::new(mock.clone()),
            Box::new(RecordingSleeper::new()),
        )
    }

    fn schema_json(id: &str, version: &str, slug: &str) -> Value {
        json!({
            "id": id,
            "name": format!("Schema {id}"),
            "slug": slug,
            "version": {"version_id": version},
            "limit_resource_types": ["campaign"],
            "fields": [
                {"key": "geo", "label": "Geography", "type": "term",
                 "ext": {"parent_term_ids": ["term:root"]}}
            ]
        })
    }

    #[test]
    fn test_load_scope_and_aliases() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/schema/",
            &[("scope_ids", "license:1")],
            200,
            json!({"data": [schema_json("schema:1", "schema:1:v2", "topics"),
                            schema_json("schema:2", "schema:2:v1", "other")]}),
        );
        let client = client(&mock);

        let mut cache = SchemaCache::new();
        cache.load_scope(&client, "license:1").unwrap();
        assert_eq!(cache.schemas().len(), 2);
        assert_eq!(cache.topics_schema_id(), Some("schema:1"));
        assert_eq!(cache.lookup("schema:2:v1").unwrap().id, "schema:2");
        assert_eq!(cache.schemas_for_type("campaign").len(), 2);
        assert!(cache.schemas_for_type("asset").is_empty());
        assert_eq!(cache.term_fields().len(), 2);
    }

    #[test]
    fn test_get_memoizes() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/schema/schema:9",
            200,
            json!({"data": schema_json("schema:9", "schema:9:v1", "x")}),
        );
        let client = client(&mock);

        let mut cache = SchemaCache::new();
        assert_eq!(cache.get(&client, "schema:9").unwrap().id, "schema:9");
        assert_eq!(cache.get(&client, "schema:9").unwrap().id, "schema:9");
        assert_eq!(cache.get(&client, "schema:9:v1").unwrap().id, "schema:9");
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_get_old_version_aliases_its_own_schema() {
        let mock = MockTransport::new();
        let mut current = schema_json("schema:1", "schema:1:v2", "x");
        current["name"] = json!("One");
        mock.respond(Method::Get, "/v5/schema/schema:1:v1", 200, json!({"data": current.clone()}));
        let client = client(&mock);

        let mut cache = SchemaCache::new();
        cache.insert(serde_json::from_value(current).unwrap());
        let mut other = schema_json("schema:2", "schema:2:v1", "y");
        other["name"] = json!("Two");
        cache.insert(serde_json::from_value(other).unwrap());

        assert_eq!(cache.get(&client, "schema:1:v1").unwrap().name, "One");
        assert_eq!(cache.lookup("schema:1:v1").unwrap().id, "schema:1");
        assert_eq!(cache.lookup("schema:2").unwrap().name, "Two");
        assert_eq!(cache.schemas().len(), 2);
    }

    #[test]
    fn test_load_system() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/schema/",
            &[("scope_ids", "builtin_scope:system")],
            200,
            json!({"data": [
                {"id": "schema:a", "name": "Asset Metadata", "version": {"version_id": "schema:a:v1"}},
                {"id": "schema:u", "name": "Usage Rights", "version": {"version_id": "schema:u:v1"}}
            ]}),
        );
        let client = client(&mock);

        let mut cache = SchemaCache::new();
        cache.load_system(&client).unwrap();
        assert_eq!(cache.asset_schema_id(), Some("schema:a:v1"));
        assert!(cache.is_system("schema:u:v1"));
        assert!(!cache.is_system("schema:1"));
    }

    #[test]
    fn test_load_system_missing_schema() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v5/schema/", 200, json!({"data": []}));
        let client = client(&mock);
        assert!(matches!(
            SchemaCache::new().load_system(&client),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_setup_builds_indexes() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/term/",
            &[("ids", "term:root")],
            200,
            json!({"data": [{"id": "term:root", "name": "Geo", "taxonomy_id": "taxonomy:1"}],
                   "pagination": {"total": 1}}),
        );
        mock.respond_with_query(
            Method::Get,
            "/v5/taxonomy/",
            &[("ids", "taxonomy:1")],
            200,
            json!({"data": [{"id": "taxonomy:1", "name": "Geography", "root_id": "term:root", "max_depth": 3}]}),
        );
        mock.respond_with_query(
            Method::Get,
            "/v5/term/",
            &[("mode", "taxonomy"), ("parent_ids", "term:root")],
            200,
            json!({"data": [
                {"id": "term:eu", "name": "Europe", "path_ids": ["term:root"]},
                {"id": "term:fr", "name": "France", "path_ids": ["term:root", "term:eu"]}
            ], "pagination": {"total": 2}}),
        );
        let client = client(&mock);

        let mut schemas = SchemaCache::new();
        schemas.insert(serde_json::from_value(schema_json("schema:1", "schema:1:v1", "s")).unwrap());
        let mut taxonomies = TaxonomyCache::new();
        taxonomies.setup(&client, &schemas).unwrap();

        let index = taxonomies.index("term:root").unwrap();
        assert_eq!(index.resolve_leaf("Europe|France"), Some("term:fr"));
        let names: Vec<&str> = taxonomies.indexes().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Geography"]);

        let walk = mock.requests_to(Method::Get, "/v5/term/");
        assert!(walk.iter().any(|r| r.query_value("depth") == Some("3")));
    }

    #[test]
    fn test_setup_requests_each_taxonomy_once() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/term/",
            &[("ids", "term:a,term:b,term:c")],
            200,
            json!({"data": [
                {"id": "term:a", "name": "A", "taxonomy_id": "taxonomy:1"},
                {"id": "term:b", "name": "B", "taxonomy_id": "taxonomy:2"},
                {"id": "term:c", "name": "C", "taxonomy_id": "taxonomy:1"}
            ], "pagination": {"total": 3}}),
        );
        mock.respond(Method::Get, "/v5/taxonomy/", 200, json!({"data": []}));
        let client = client(&mock);

        let mut schema = schema_json("schema:1", "schema:1:v1", "s");
        schema["fields"] = json!([
            {"key": "a", "label": "A", "type": "term", "ext": {"parent_term_ids": ["term:a"]}},
            {"key": "b", "label": "B", "type": "term", "ext": {"parent_term_ids": ["term:b"]}},
            {"key": "c", "label": "C", "type": "term", "ext": {"parent_term_ids": ["term:c"]}}
        ]);
        let mut schemas = SchemaCache::new();
        schemas.insert(serde_json::from_value(schema).unwrap());
        TaxonomyCache::new().setup(&client, &schemas).unwrap();

        let listing = mock.requests_to(Method::Get, "/v5/taxonomy/");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].query_value("ids"), Some("taxonomy:1,taxonomy:2"));
    }

    #[test]
    fn test_full_path_memoizes_ancestors() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/term/term:paris",
            200,
            json!({"data": {"id": "term:paris", "name": "Paris", "path_ids": ["term:root", "term:eu", "term:fr"]}}),
        );
        mock.respond(
            Method::Get,
            "/v5/term/term:lyon",
            200,
            json!({"data": {"id": "term:lyon", "name": "Lyon", "path_ids": ["term:root", "term:eu", "term:fr"]}}),
        );
        mock.respond(
            Method::Get,
            "/v5/term/term:eu",
            200,
            json!({"data": {"id": "term:eu", "name": "Europe", "path_ids": ["term:root"]}}),
        );
        mock.respond(
            Method::Get,
            "/v5/term/term:fr",
            200,
            json!({"data": {"id": "term:fr", "name": "France", "path_ids": ["term:root", "term:eu"]}}),
        );
        let client = client(&mock);

        let mut cache = TaxonomyCache::new();
        assert_eq!(cache.full_path(&client, "term:paris").unwrap(), "Europe|France|Paris");
        assert_eq!(cache.full_path(&client, "term:lyon").unwrap(), "Europe|France|Lyon");
        assert_eq!(cache.full_path(&client, "term:paris").unwrap(), "Europe|France|Paris");
        assert_eq!(mock.requests_to(Method::Get, "/v5/term/term:eu").len(), 1);
        assert_eq!(mock.requests_to(Method::Get, "/v5/term/term:paris").len(), 1);
    }

    #[test]
    fn test_full_path_of_missing_term_is_blank() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let mut cache = TaxonomyCache::new();
        assert_eq!(cache.full_path(&client, "term:gone").unwrap(), "");
    }
}
