// src/cli/mod.rs
//! CLI definitions for cms-export
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! Exports:
//! - `export` - Export campaigns of one or more licenses to CSV
//!
//! Metadata:
//! - `update` - Write metadata from a CSV file
//! - `copy` / `merge` - Carry one schema's record between objects
//! - `taxonomies` - List the breadcrumbs of every indexed taxonomy
//! - `values` - List accepted values of term and select fields

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cms-export")]
#[command(version)]
#[command(about = "Export campaigns and translate custom metadata of a content-management API", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials shared by every API command
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// API key (falls back to the configuration file)
    #[arg(long, env = "CMS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

/// Source and target of a copy or merge
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    /// License owning the schema
    #[arg(long)]
    pub license_uid: String,

    /// Schema id of the record to carry over
    #[arg(long)]
    pub schema: String,

    /// Object to read the record from
    #[arg(long)]
    pub source: String,

    /// Object to write the record to
    #[arg(long)]
    pub target: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export campaigns with their custom metadata
    Export {
        #[command(flatten)]
        api: ApiArgs,

        /// Licenses to export
        #[arg(long, required = true, num_args = 1..)]
        license_uid: Vec<String>,

        /// Directory receiving one CSV file per license
        #[arg(long, default_value = ".")]
        out_directory: PathBuf,

        /// Include campaigns of child scopes
        #[arg(long)]
        extend_scopes: bool,

        /// Only campaigns updated after this date, or within this many days
        #[arg(long)]
        since: Option<String>,

        /// Extra listing parameter (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Also load the export into this SQLite analytics database
        #[arg(long)]
        warehouse: Option<PathBuf>,

        /// Show a progress bar instead of progress log lines
        #[arg(long)]
        progress_bar: bool,
    },

    /// Write metadata of objects listed in a CSV file
    Update {
        #[command(flatten)]
        api: ApiArgs,

        /// License owning the objects
        #[arg(long)]
        license_uid: String,

        /// CSV file with one object per row
        #[arg(long)]
        input: PathBuf,

        /// Column holding the object uid
        #[arg(long)]
        key_field: String,

        /// Skip Asset Metadata and Usage Rights
        #[arg(long)]
        no_standard: bool,

        /// Skip custom schemas
        #[arg(long)]
        no_custom: bool,

        /// Tag every term along a path, not only the leaf
        #[arg(long)]
        tag_path_terms: bool,
    },

    /// Copy one schema's record from one object to another
    Copy {
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Merge one schema's term fields from one object into another
    Merge {
        #[command(flatten)]
        transfer: TransferArgs,

        /// Print the request instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// List the breadcrumbs of every taxonomy used by a license
    Taxonomies {
        #[command(flatten)]
        api: ApiArgs,

        #[arg(long)]
        license_uid: String,
    },

    /// List the accepted values of term and select fields
    Values {
        #[command(flatten)]
        api: ApiArgs,

        #[arg(long)]
        license_uid: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse `KEY=VALUE`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export() {
        let cli = Cli::try_parse_from([
            "cms-export",
            "export",
            "--api-key",
            "k",
            "--license-uid",
            "license:1",
            "license:2",
            "--param",
            "statuses=active",
            "--since",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                license_uid,
                params,
                since,
                ..
            } => {
                assert_eq!(license_uid, vec!["license:1", "license:2"]);
                assert_eq!(params, vec![("statuses".to_string(), "active".to_string())]);
                assert_eq!(since.as_deref(), Some("7"));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
