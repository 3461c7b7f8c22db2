// src/error.rs

//! Error types for cms-export
//!
//! A single error enum covers the transport wrapper, the metadata engine,
//! the export sinks and configuration loading.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the library
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure that survived every retry
    #[error("transport error: {0}")]
    Transport(String),

    /// The API rejected the request (4xx) or answered with an `errors` body
    #[error("API error{}: {url} {params} -> {body}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        body: String,
        url: String,
        params: String,
    },

    /// Response body could not be decoded into the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Referenced object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied invalid arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Rows are too recent to be modified in the warehouse table
    #[error("streaming buffer conflict: {0}")]
    StreamingBuffer(String),

    /// Warehouse table stayed locked after every retry
    #[error("warehouse update conflict after {attempts} attempts: {message}")]
    WarehouseConflict { attempts: u32, message: String },

    /// Warehouse database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an API error without an HTTP status (logical failure)
    pub fn api(body: impl Into<String>, url: impl Into<String>, params: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            body: body.into(),
            url: url.into(),
            params: params.into(),
        }
    }

    /// HTTP status carried by an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}
