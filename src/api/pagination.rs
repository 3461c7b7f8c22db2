// src/api/pagination.rs

//! Pagination collector
//!
//! List endpoints answer `{ "data": [...], "pagination": { "total": N } }`
//! (some older endpoints use `meta.total`). Pages are fetched strictly in
//! order because the total is only known once the first page arrives.

use crate::error::{Error, Result};
use serde_json::Value;
use tracing::debug;

use super::client::ApiClient;
use super::transport::Query;

/// Read the declared total of a list page
fn page_total(page: &Value) -> Option<u64> {
    page.pointer("/pagination/total")
        .and_then(Value::as_u64)
        .or_else(|| page.pointer("/meta/total").and_then(Value::as_u64))
}

/// Fetch every record of a list endpoint using the client's page size
pub fn collect_all(client: &ApiClient, path: &str, params: &Query) -> Result<Vec<Value>> {
    collect_all_with_limit(client, path, params, client.page_limit())
}

/// Fetch every record of a list endpoint with an explicit page size
pub fn collect_all_with_limit(
    client: &ApiClient,
    path: &str,
    params: &Query,
    limit: u64,
) -> Result<Vec<Value>> {
    let limit = limit.max(1);
    let mut records = Vec::new();
    let mut offset = 0u64;

    loop {
        let mut query: Query = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        query.extend(
            params
                .iter()
                .filter(|(k, _)| k != "limit" && k != "offset")
                .cloned(),
        );

        let page = client.get(path, &query)?;
        let total = page_total(&page).ok_or_else(|| {
            Error::api(
                page.to_string(),
                client.url_for(path),
                "page is missing pagination.total and meta.total",
            )
        })?;

        if let Some(items) = page.get("data").and_then(Value::as_array) {
            records.extend(items.iter().cloned());
        }

        offset += limit;
        debug!("Collected {} of {} from {}", records.len(), total, path);
        if offset >= total {
            break;
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockTransport, RecordingSleeper};
    use crate::api::transport::{query, Method};
    use crate::config::Config;
    use serde_json::json;

    fn client(mock: &MockTransport, page_limit: u64) -> ApiClient {
        let config = Config {
            base_url: "https://cms.test/api".to_string(),
            page_limit,
            ..Config::default()
        };
        ApiClient::with_transport(
            &config,
            "key",
            Box::new(mock.clone()),
            Box::new(RecordingSleeper::new()),
        )
    }

    #[test]
    fn test_collects_pages_in_order() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/campaign/",
            &[("offset", "0")],
            200,
            json!({"data": [{"id": "campaign:1"}, {"id": "campaign:2"}], "pagination": {"total": 5}}),
        );
        mock.respond_with_query(
            Method::Get,
            "/v5/campaign/",
            &[("offset", "2")],
            200,
            json!({"data": [{"id": "campaign:3"}, {"id": "campaign:4"}], "pagination": {"total": 5}}),
        );
        mock.respond_with_query(
            Method::Get,
            "/v5/campaign/",
            &[("offset", "4")],
            200,
            json!({"data": [{"id": "campaign:5"}], "pagination": {"total": 5}}),
        );

        let client = client(&mock, 2);
        let all = collect_all(&client, "/v5/campaign/", &query(&[("scope_ids", "license:1")])).unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["campaign:1", "campaign:2", "campaign:3", "campaign:4", "campaign:5"]);

        let sent = mock.requests();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|r| r.query_value("scope_ids") == Some("license:1")));
        assert!(sent.iter().all(|r| r.query_value("limit") == Some("2")));
    }

    #[test]
    fn test_meta_total_fallback() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/metadata/",
            200,
            json!({"data": [{"id": "metadata:1"}], "meta": {"total": 1}}),
        );

        let client = client(&mock, 100);
        let all = collect_all(&client, "/v5/metadata/", &Query::new()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_empty_listing() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/campaign/",
            200,
            json!({"data": [], "pagination": {"total": 0}}),
        );

        let client = client(&mock, 100);
        assert!(collect_all(&client, "/v5/campaign/", &Query::new()).unwrap().is_empty());
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_missing_total_is_error() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v5/campaign/", 200, json!({"data": []}));

        let client = client(&mock, 100);
        assert!(collect_all(&client, "/v5/campaign/", &Query::new()).is_err());
    }

    #[test]
    fn test_caller_limit_offset_are_overridden() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/term/",
            200,
            json!({"data": [], "pagination": {"total": 0}}),
        );

        let client = client(&mock, 100);
        collect_all(&client, "/v5/term/", &query(&[("offset", "50")])).unwrap();
        let sent = mock.requests();
        assert_eq!(sent[0].query.iter().filter(|(k, _)| k == "offset").count(), 1);
        assert_eq!(sent[0].query_value("offset"), Some("0"));
    }
}
