// src/lib.rs

//! cms-export
//!
//! Campaign export and custom metadata translation for a content-management
//! REST API.
//!
//! # Architecture
//!
//! - `api`: transport seam, retrying client, pagination and uid helpers
//! - `metadata`: schemas, taxonomy indexes and the flat <-> typed translator
//! - `export`: campaign rows, CSV files and the SQLite analytics table
//! - `progress`: progress reporting shared by the long-running commands

pub mod api;
pub mod config;
mod error;
pub mod export;
pub mod metadata;
pub mod progress;

pub use error::{Error, Result};
pub use progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
