// src/api/mock.rs

//! In-memory transport and sleeper
//!
//! `MockTransport` answers requests from scripted routes and records every
//! request it sees; `RecordingSleeper` records requested delays instead of
//! waiting. Both are cheap handles over shared state, so a test can keep a
//! clone while the client owns another.

use super::transport::{HttpRequest, HttpResponse, Method, Sleeper, Transport};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    Failure(String),
}

#[derive(Debug)]
struct Route {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    replies: VecDeque<MockReply>,
}

impl Route {
    fn matches(&self, request: &HttpRequest) -> bool {
        self.method == request.method
            && request_path(&request.url) == self.path
            && self
                .query
                .iter()
                .all(|(k, v)| request.query_value(k) == Some(v.as_str()))
    }

    /// Pop the next reply; the last one stays in place and repeats
    fn next_reply(&mut self) -> Option<MockReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// Path portion of a URL (`/api/v5/term/` → `/v5/term/` once the API root is stripped)
fn request_path(url: &str) -> &str {
    let path = match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/")
        }
        None => url,
    };
    match path.find("/v") {
        Some(idx) => &path[idx..],
        None => path,
    }
}

#[derive(Debug, Default)]
struct MockState {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// Scripted transport
///
/// Routes match on method, exact API path (e.g. `/v5/term/`) and a subset
/// of query parameters; the most specific route (most query parameters)
/// wins. Unmatched requests answer 404.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, query: &[(&str, &str)], reply: MockReply) {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut state = self.state.borrow_mut();
        if let Some(route) = state
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path && r.query == query)
        {
            route.replies.push_back(reply);
            return;
        }
        state.routes.push(Route {
            method,
            path: path.to_string(),
            query,
            replies: VecDeque::from([reply]),
        });
    }

    /// Answer `method path` with a JSON body
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond_with_query(method, path, &[], status, body);
    }

    /// Answer `method path` carrying the given query parameters
    pub fn respond_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        status: u16,
        body: Value,
    ) {
        self.push(
            method,
            path,
            query,
            MockReply::Response(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Answer with a raw (possibly non-JSON) body
    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &str) {
        self.push(
            method,
            path,
            &[],
            MockReply::Response(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Fail at the network level
    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, &[], MockReply::Failure(message.to_string()));
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.borrow().requests.clone()
    }

    /// Requests with the given method whose path matches exactly
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| r.method == method && request_path(&r.url) == path)
            .cloned()
            .collect()
    }

    /// Requests with the given method whose path starts with `prefix`
    pub fn requests_with_prefix(&self, method: Method, prefix: &str) -> Vec<HttpRequest> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| r.method == method && request_path(&r.url).starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String> {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());

        let reply = state
            .routes
            .iter_mut()
            .filter(|r| r.matches(request))
            .max_by_key(|r| r.query.len())
            .and_then(|r| r.next_reply());

        match reply {
            Some(MockReply::Response(resp)) => Ok(resp),
            Some(MockReply::Failure(msg)) => Err(msg),
            None => Ok(HttpResponse {
                status: 404,
                body: serde_json::json!({"errors": [{"message": "no mock route"}]}).to_string(),
            }),
        }
    }
}

/// Sleeper that records delays instead of waiting
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.delays.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str, query: &[(&str, &str)]) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            query: super::super::transport::query(query),
            body: None,
            api_key: "k".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_most_specific_route_wins() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v5/schema/", 200, serde_json::json!({"data": "generic"}));
        mock.respond_with_query(
            Method::Get,
            "/v5/schema/",
            &[("scope_ids", "builtin_scope:system")],
            200,
            serde_json::json!({"data": "system"}),
        );

        let resp = mock
            .execute(&get("https://x/api/v5/schema/", &[("scope_ids", "builtin_scope:system")]))
            .unwrap();
        assert!(resp.body.contains("system"));

        let resp = mock
            .execute(&get("https://x/api/v5/schema/", &[("scope_ids", "license:1")]))
            .unwrap();
        assert!(resp.body.contains("generic"));
    }

    #[test]
    fn test_replies_are_consumed_then_repeat() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/v5/me", 429, serde_json::json!({}));
        mock.respond(Method::Get, "/v5/me", 200, serde_json::json!({"data": {}}));

        let req = get("https://x/api/v5/me", &[]);
        assert_eq!(mock.execute(&req).unwrap().status, 429);
        assert_eq!(mock.execute(&req).unwrap().status, 200);
        assert_eq!(mock.execute(&req).unwrap().status, 200);
        assert_eq!(mock.requests().len(), 3);
    }

    #[test]
    fn test_unmatched_is_404() {
        let mock = MockTransport::new();
        let resp = mock.execute(&get("https://x/api/v5/term/term:9", &[])).unwrap();
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        let handle = sleeper.clone();
        sleeper.sleep(Duration::from_secs(1));
        sleeper.sleep(Duration::from_secs(60));
        assert_eq!(handle.delays().len(), 2);
        assert_eq!(handle.total(), Duration::from_secs(61));
    }
}
