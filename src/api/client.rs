// src/api/client.rs

//! API client with retry support
//!
//! Wraps a `Transport` with the retry policy of the remote API:
//! - network failures, undecodable bodies and 5xx answers are retried
//!   with a fixed delay, up to `max_attempts`
//! - HTTP 429 sleeps for the rate-limit interval and retries without
//!   consuming an attempt
//! - any other 4xx fails immediately
//! - a body carrying an `errors` key is a failure even on 2xx

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::transport::{
    HttpRequest, HttpResponse, Method, Query, ReqwestTransport, Sleeper, ThreadSleeper, Transport,
};

/// HTTP status returned by the API when the rate limit is hit
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Client for the remote REST API
pub struct ApiClient {
    base_url: String,
    api_key: String,
    retry: RetryConfig,
    page_limit: u64,
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    calls: RefCell<BTreeMap<Method, u64>>,
}

impl ApiClient {
    /// Create a client using the reqwest transport
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(
            config,
            api_key,
            Box::new(transport),
            Box::new(ThreadSleeper),
        ))
    }

    /// Create a client over an arbitrary transport and sleeper
    pub fn with_transport(
        config: &Config,
        api_key: impl Into<String>,
        transport: Box<dyn Transport>,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry: config.retry.clone(),
            page_limit: config.page_limit,
            transport,
            sleeper,
            calls: RefCell::new(BTreeMap::new()),
        }
    }

    /// Page size used when collecting paginated listings
    pub fn page_limit(&self) -> u64 {
        self.page_limit
    }

    /// Number of calls issued with `method` (retries not included)
    pub fn call_count(&self, method: Method) -> u64 {
        self.calls.borrow().get(&method).copied().unwrap_or(0)
    }

    /// Number of calls issued with any method
    pub fn total_calls(&self) -> u64 {
        self.calls.borrow().values().sum()
    }

    /// Block for `duration` through the configured sleeper
    pub fn sleep(&self, duration: std::time::Duration) {
        self.sleeper.sleep(duration);
    }

    /// Full URL for an API path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// GET a single object (no pagination)
    pub fn get(&self, path: &str, query: &Query) -> Result<Value> {
        let (_, body) = self.send(Method::Get, path, query, None)?;
        Ok(body)
    }

    /// POST a payload; unwraps a top-level `data` member when present
    pub fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let (_, body) = self.send(Method::Post, path, &Query::new(), Some(payload))?;
        Ok(unwrap_data(body))
    }

    /// PUT a payload; unwraps a top-level `data` member when present
    pub fn put(&self, path: &str, payload: &Value) -> Result<Value> {
        let (_, body) = self.send(Method::Put, path, &Query::new(), Some(payload))?;
        Ok(unwrap_data(body))
    }

    /// DELETE an object; the API answers 204 on success
    pub fn delete(&self, path: &str) -> Result<()> {
        let (status, body) = self.send(Method::Delete, path, &Query::new(), None)?;
        if status != 204 {
            return Err(Error::Api {
                status: Some(status),
                body: body.to_string(),
                url: self.url_for(path),
                params: String::new(),
            });
        }
        Ok(())
    }

    /// Issue a request, applying the retry policy
    ///
    /// Returns the final status code and decoded body (`Null` for an empty body).
    pub fn send(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        payload: Option<&Value>,
    ) -> Result<(u16, Value)> {
        *self.calls.borrow_mut().entry(method).or_insert(0) += 1;

        let request = HttpRequest {
            method,
            url: self.url_for(path),
            query: query.clone(),
            body: payload.map(|p| p.to_string()),
            api_key: self.api_key.clone(),
            timeout: self.retry.timeout(),
        };
        let params = describe_params(query, payload);
        debug!("{} {} {}", method, request.url, params);

        let mut failures = 0u32;
        loop {
            let failure = match self.transport.execute(&request) {
                Ok(response) if response.status == STATUS_TOO_MANY_REQUESTS => {
                    warn!(
                        "Rate limit hit on {} {}, sleeping {}s",
                        method, request.url, self.retry.rate_limit_secs
                    );
                    self.sleeper.sleep(self.retry.rate_limit_delay());
                    continue;
                }
                Ok(response) if (400..500).contains(&response.status) => {
                    return Err(Error::Api {
                        status: Some(response.status),
                        body: response.body,
                        url: request.url.clone(),
                        params,
                    });
                }
                Ok(response) if response.status >= 500 => {
                    format!("HTTP {} from {}", response.status, request.url)
                }
                Ok(response) => match decode_body(&response) {
                    Ok(body) => {
                        if body.get("errors").is_some() {
                            return Err(Error::Api {
                                status: Some(response.status),
                                body: response.body,
                                url: request.url.clone(),
                                params,
                            });
                        }
                        return Ok((response.status, body));
                    }
                    Err(e) => format!("invalid JSON from {}: {e}", request.url),
                },
                Err(e) => e,
            };

            failures += 1;
            if failures >= self.retry.max_attempts {
                return Err(Error::Transport(format!(
                    "{method} {} failed after {failures} attempts: {failure}",
                    request.url
                )));
            }
            warn!(
                "Attempt {} of {} {} failed: {}, retrying...",
                failures, method, request.url, failure
            );
            self.sleeper.sleep(self.retry.delay());
        }
    }
}

fn decode_body(response: &HttpResponse) -> std::result::Result<Value, serde_json::Error> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body)
}

fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Render query and payload for error reports (the API key is never included)
fn describe_params(query: &Query, payload: Option<&Value>) -> String {
    let query = serde_json::to_string(query).unwrap_or_default();
    match payload {
        Some(p) => format!("{query} {p}"),
        None => query,
    }
}
