// src/commands/mod.rs
//! Command handlers for the cms-export CLI

mod export;
mod metadata;

pub use export::cmd_export;
pub use metadata::{cmd_copy, cmd_merge, cmd_taxonomies, cmd_update, cmd_values};

use anyhow::{Context, Result};
use cms_export::api::ApiClient;
use cms_export::config::{load_config, Config};
use std::path::Path;

/// Load the configuration for a command run
pub fn load(config_path: Option<&Path>) -> Result<Config> {
    load_config(config_path).context("failed to load configuration")
}

/// Build an API client from the command-line key or the configured one
fn open_client(config: &Config, api_key: Option<&str>) -> Result<ApiClient> {
    let api_key = api_key
        .or(config.api_key.as_deref())
        .filter(|k| !k.is_empty())
        .context("an API key is required (--api-key or CMS_API_KEY)")?;
    Ok(ApiClient::new(config, api_key)?)
}
