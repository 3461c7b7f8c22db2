// src/api/resources.rs

//! Small typed wrappers around individual API resources
//!
//! Users, licenses, folders, URL uploads and post status changes. Each
//! helper is one or two calls through `ApiClient`.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::transport::{query, Query};
use super::uid::id_from_uid;

/// Interval between upload status polls
pub const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Timestamp layout the API expects for scheduled times
pub const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Post fields carried over when changing a post's status
const POST_STATUS_FIELDS: &[&str] = &["topic_ids", "term_ids", "ext", "description", "name", "status"];

fn string_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode(format!("missing string at {pointer} in {value}")))
}

/// Numeric id of the user owning the API key
pub fn current_user_id(client: &ApiClient) -> Result<String> {
    let me = client.get("/v5/me", &Query::new())?;
    Ok(id_from_uid(string_at(&me, "/data/id")?).to_string())
}

/// Timezone configured on a license
pub fn license_timezone(client: &ApiClient, license_uid: &str) -> Result<String> {
    let license = client.get(&format!("/v5/license/{license_uid}"), &Query::new())?;
    Ok(string_at(&license, "/data/timezone")?.to_string())
}

/// Uid of the primary (root) folder of a license
pub fn root_folder_id(client: &ApiClient, license_uid: &str) -> Result<String> {
    let folders = client.get(
        "/v5/folder/",
        &query(&[("ids", "folder:primary"), ("scope_ids", license_uid)]),
    )?;
    Ok(string_at(&folders, "/data/0/id")?.to_string())
}

/// Outcome of a URL upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub upload_id: String,
    /// `None` when polling gave up before the asset was ready
    pub asset_id: Option<String>,
    pub duplicate: bool,
}

/// Import a remote URL as an asset and wait for it to become available
///
/// `give_up_after` bounds the polling time; `None` polls until the upload
/// settles.
pub fn upload_url_asset(
    client: &ApiClient,
    url: &str,
    scope_uid: &str,
    folder_uid: &str,
    give_up_after: Option<Duration>,
) -> Result<UploadResult> {
    let payload = json!({
        "type": "url",
        "destination_id": folder_uid,
        "scope_id": scope_uid,
        "ext": { "url": url },
        "upload_state": "preparing",
    });
    let created = client.post("/v5/upload/", &payload)?;
    let upload_id = created
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode(format!("upload response has no id: {created}")))?
        .to_string();
    info!("Started upload {} for {}", upload_id, url);

    let (asset_id, duplicate) = wait_for_upload(client, &upload_id, give_up_after)?;
    Ok(UploadResult {
        upload_id,
        asset_id,
        duplicate,
    })
}

/// Poll an upload until it yields an asset
fn wait_for_upload(
    client: &ApiClient,
    upload_id: &str,
    give_up_after: Option<Duration>,
) -> Result<(Option<String>, bool)> {
    let path = format!("/v5/upload/{upload_id}");
    let mut waited = Duration::ZERO;

    loop {
        let response = client.get(&path, &Query::new())?;
        let status = response
            .pointer("/data/status")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match status {
            "ready" | "complete" | "duplicate" => {
                let asset_id = response
                    .pointer("/data/asset_id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if asset_id.is_some() {
                    debug!("Upload {} asset ready: {:?}", upload_id, asset_id);
                    return Ok((asset_id, status == "duplicate"));
                }
            }
            "error" => {
                return Err(Error::api(
                    response.to_string(),
                    client.url_for(&path),
                    "error creating asset from upload",
                ));
            }
            _ => {}
        }

        if let Some(limit) = give_up_after {
            if waited >= limit {
                warn!("Giving up on upload {} after {:?}", upload_id, waited);
                return Ok((None, false));
            }
        }
        debug!("Upload {} not ready ({}), waiting", upload_id, status);
        client.sleep(UPLOAD_POLL_INTERVAL);
        waited += UPLOAD_POLL_INTERVAL;
    }
}

/// When a post should go live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveAt {
    /// A few seconds from now
    Now,
    /// Clear the scheduled time
    Unset,
    At(DateTime<Utc>),
}

/// Change a post's status, keeping its content fields
pub fn update_post_status(
    client: &ApiClient,
    post: &Value,
    status: &str,
    url: Option<&str>,
    live_at: LiveAt,
) -> Result<Value> {
    let post_id = string_at(post, "/id")?;

    let mut payload = Map::new();
    for field in POST_STATUS_FIELDS {
        payload.insert(
            field.to_string(),
            post.get(*field).cloned().unwrap_or(Value::Null),
        );
    }

    let live_at = match live_at {
        LiveAt::Now => Some(Utc::now() + ChronoDuration::seconds(5)),
        LiveAt::Unset => None,
        LiveAt::At(at) => Some(at),
    };
    payload.insert(
        "live_at".to_string(),
        live_at
            .map(|t| Value::String(t.format(API_TIMESTAMP_FORMAT).to_string()))
            .unwrap_or(Value::Null),
    );
    if live_at.is_some() {
        let timezone = license_timezone(client, string_at(post, "/scope_id")?)?;
        payload.insert("live_at_timezone".to_string(), Value::String(timezone));
    }
    payload.insert("status".to_string(), Value::String(status.to_string()));
    payload.insert(
        "url".to_string(),
        url.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null),
    );

    client.put(&format!("/v5/post/{post_id}"), &Value::Object(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockTransport, RecordingSleeper};
    use crate::api::transport::Method;
    use crate::config::Config;
    use chrono::TimeZone;

    fn client(mock: &MockTransport, sleeper: &RecordingSleeper) -> ApiClient {
        let config = Config {
            base_url: "https://cms.test/api".to_string(),
            ..Config::default()
        };
        ApiClient::with_transport(&config, "key", Box::new(mock.clone()), Box::new(sleeper.clone()))
    }

    #[test]
    fn test_current_user_id() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v5/me", 200, json!({"data": {"id": "user:77"}}));
        let client = client(&mock, &RecordingSleeper::new());
        assert_eq!(current_user_id(&client).unwrap(), "77");
    }

    #[test]
    fn test_root_folder_id() {
        let mock = MockTransport::new();
        mock.respond_with_query(
            Method::Get,
            "/v5/folder/",
            &[("scope_ids", "license:1")],
            200,
            json!({"data": [{"id": "folder:123"}]}),
        );
        let client = client(&mock, &RecordingSleeper::new());
        assert_eq!(root_folder_id(&client, "license:1").unwrap(), "folder:123");
    }

    #[test]
    fn test_upload_polls_until_ready() {
        let mock = MockTransport::new();
        let sleeper = RecordingSleeper::new();
        mock.respond(Method::Post, "/v5/upload/", 201, json!({"data": {"id": "upload:5"}}));
        mock.respond(Method::Get, "/v5/upload/upload:5", 200, json!({"data": {"status": "preparing"}}));
        mock.respond(
            Method::Get,
            "/v5/upload/upload:5",
            200,
            json!({"data": {"status": "duplicate", "asset_id": "asset:9"}}),
        );

        let client = client(&mock, &sleeper);
        let result =
            upload_url_asset(&client, "https://a.example/x.png", "license:1", "folder:primary", None)
                .unwrap();
        assert_eq!(result.upload_id, "upload:5");
        assert_eq!(result.asset_id.as_deref(), Some("asset:9"));
        assert!(result.duplicate);
        assert_eq!(sleeper.delays(), vec![UPLOAD_POLL_INTERVAL]);

        let body = mock.requests_to(Method::Post, "/v5/upload/")[0].json_body().unwrap();
        assert_eq!(body["ext"]["url"], "https://a.example/x.png");
        assert_eq!(body["destination_id"], "folder:primary");
    }

    #[test]
    fn test_upload_error_status() {
        let mock = MockTransport::new();
        mock.respond(Method::Post, "/v5/upload/", 201, json!({"data": {"id": "upload:6"}}));
        mock.respond(Method::Get, "/v5/upload/upload:6", 200, json!({"data": {"status": "error"}}));

        let client = client(&mock, &RecordingSleeper::new());
        assert!(upload_url_asset(&client, "https://a.example", "license:1", "folder:primary", None).is_err());
    }

    #[test]
    fn test_upload_gives_up() {
        let mock = MockTransport::new();
        let sleeper = RecordingSleeper::new();
        mock.respond(Method::Post, "/v5/upload/", 201, json!({"data": {"id": "upload:7"}}));
        mock.respond(Method::Get, "/v5/upload/upload:7", 200, json!({"data": {"status": "preparing"}}));

        let client = client(&mock, &sleeper);
        let result = upload_url_asset(
            &client,
            "https://a.example",
            "license:1",
            "folder:primary",
            Some(Duration::from_secs(6)),
        )
        .unwrap();
        assert!(result.asset_id.is_none());
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[test]
    fn test_update_post_status() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/v5/license/license:1",
            200,
            json!({"data": {"timezone": "America/New_York"}}),
        );
        mock.respond(Method::Put, "/v5/post/post:3", 200, json!({"data": {"id": "post:3"}}));

        let post = json!({
            "id": "post:3",
            "scope_id": "license:1",
            "name": "Launch",
            "description": "",
            "topic_ids": [],
            "term_ids": ["term:1"],
            "ext": {},
            "status": "draft",
            "body": "ignored"
        });
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let client = client(&mock, &RecordingSleeper::new());
        update_post_status(&client, &post, "queued", None, LiveAt::At(at)).unwrap();

        let body = mock.requests_to(Method::Put, "/v5/post/post:3")[0].json_body().unwrap();
        assert_eq!(body["status"], "queued");
        assert_eq!(body["live_at"], "2024-05-01T12:30:00.000Z");
        assert_eq!(body["live_at_timezone"], "America/New_York");
        assert_eq!(body["term_ids"], json!(["term:1"]));
        assert!(body.get("body").is_none());
    }

    #[test]
    fn test_update_post_status_unset_skips_timezone() {
        let mock = MockTransport::new();
        mock.respond(Method::Put, "/v5/post/post:4", 200, json!({"data": {}}));
        let post = json!({"id": "post:4", "scope_id": "license:1"});
        let client = client(&mock, &RecordingSleeper::new());
        update_post_status(&client, &post, "draft", Some("https://a.example"), LiveAt::Unset).unwrap();

        assert!(mock.requests_with_prefix(Method::Get, "/v5/license/").is_empty());
        let body = mock.requests_to(Method::Put, "/v5/post/post:4")[0].json_body().unwrap();
        assert!(body["live_at"].is_null());
        assert_eq!(body["url"], "https://a.example");
    }
}
