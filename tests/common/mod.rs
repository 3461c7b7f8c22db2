// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! `script_license` scripts a mock API with one license carrying a
//! "Campaign Info" schema (select, text and term fields over a small
//! Geography taxonomy), a "Topics" schema and the two system schemas.

#![allow(dead_code)]

use cms_export::api::mock::{MockTransport, RecordingSleeper};
use cms_export::api::{ApiClient, Method};
use cms_export::config::Config;
use serde_json::{json, Value};

pub const LICENSE: &str = "license:1";

/// Client over a mock transport that never sleeps
pub fn client(mock: &MockTransport) -> ApiClient {
    client_with_sleeper(mock, RecordingSleeper::new())
}

pub fn client_with_sleeper(mock: &MockTransport, sleeper: RecordingSleeper) -> ApiClient {
    ApiClient::with_transport(&Config::default(), "test-key", Box::new(mock.clone()), Box::new(sleeper))
}

/// One list page holding every item
pub fn page(items: Value) -> Value {
    let total = items.as_array().map(Vec::len).unwrap_or(0);
    json!({"data": items, "pagination": {"total": total}})
}

pub fn campaign_schema() -> Value {
    json!({
        "id": "schema:1",
        "name": "Campaign Info",
        "slug": "campaign_info",
        "version": {"version_id": "schema:1:v2"},
        "limit_resource_types": ["campaign", "asset"],
        "fields": [
            {"key": "region", "label": "Region", "type": "select",
             "ext": {"values": [{"label": "North", "value": "n"}, {"label": "South", "value": "s"}]}},
            {"key": "notes", "label": "Notes", "type": "text"},
            {"key": "geo", "label": "Geography", "type": "term",
             "ext": {"parent_term_ids": ["term:root"]}}
        ]
    })
}

pub fn topics_schema() -> Value {
    json!({
        "id": "schema:topics",
        "name": "Topics",
        "slug": "topics",
        "version": {"version_id": "schema:topics:v1"},
        "limit_resource_types": ["campaign"],
        "fields": [
            {"key": "topics", "label": "Topics", "type": "term_id"}
        ]
    })
}

fn system_schema(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "version": {"version_id": format!("{id}:v1")}})
}

fn term(id: &str, name: &str, path_ids: &[&str]) -> Value {
    json!({"id": id, "name": name, "path_ids": path_ids})
}

/// Script everything `MetadataUpdater::new` reads for `LICENSE`
pub fn script_license(mock: &MockTransport) {
    mock.respond_with_query(
        Method::Get,
        "/v5/schema/",
        &[("scope_ids", LICENSE)],
        200,
        json!({"data": [campaign_schema(), topics_schema()]}),
    );
    mock.respond_with_query(
        Method::Get,
        "/v5/schema/",
        &[("scope_ids", "builtin_scope:system")],
        200,
        json!({"data": [
            system_schema("schema:asset", "Asset Metadata"),
            system_schema("schema:usage", "Usage Rights")
        ]}),
    );
    mock.respond_with_query(
        Method::Get,
        "/v5/term/",
        &[("ids", "term:root")],
        200,
        page(json!([{"id": "term:root", "name": "Geography", "taxonomy_id": "taxonomy:1"}])),
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
        page(json!([
            term("term:eu", "Europe", &["term:root"]),
            term("term:fr", "France", &["term:root", "term:eu"]),
            term("term:de", "Germany", &["term:root", "term:eu"])
        ])),
    );
    for (id, name, path) in [
        ("term:eu", "Europe", &["term:root"][..]),
        ("term:fr", "France", &["term:root", "term:eu"][..]),
        ("term:de", "Germany", &["term:root", "term:eu"][..]),
        ("term:t1", "Launch", &["term:troot"][..]),
    ] {
        mock.respond(
            Method::Get,
            &format!("/v5/term/{id}"),
            200,
            json!({"data": term(id, name, path)}),
        );
    }
}

/// Script the metadata records stored on one object
pub fn script_records(mock: &MockTransport, object_uid: &str, records: Value) {
    mock.respond_with_query(
        Method::Get,
        "/v5/metadata/",
        &[("object_ids", object_uid)],
        200,
        page(records),
    );
}

/// A campaign as returned by the campaign listing
pub fn campaign(id: &str, title: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": format!("About {title}"),
        "term_ids": [],
        "topic_ids": [],
        "scope_id": LICENSE,
        "start_at": "2024-03-01T00:00:00Z",
        "end_at": null,
        "platform_ids": [],
        "budget": null,
        "thumbnail_asset_id": null,
        "created_at": "2024-01-05T09:30:00Z",
        "updated_at": updated_at,
        "parent_id": null
    })
}
