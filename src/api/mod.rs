// src/api/mod.rs

//! Access to the remote content-management REST API
//!
//! This module provides:
//! - A transport seam with a reqwest implementation
//! - An API client applying the retry and rate-limit policy
//! - A pagination collector for list endpoints
//! - Helpers for `type:id` uids and a few single-resource calls

mod client;
mod pagination;
mod transport;

// Scripted transport for unit and integration tests
#[doc(hidden)]
pub mod mock;
pub mod resources;
pub mod uid;

pub use client::ApiClient;
pub use pagination::{collect_all, collect_all_with_limit};
pub use transport::{
    query, HttpRequest, HttpResponse, Method, Query, ReqwestTransport, Sleeper, ThreadSleeper,
    Transport,
};
