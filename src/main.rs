// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::io;

mod cli;
mod commands;

use cli::{Cli, Commands, TransferArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cms-export", &mut io::stdout());
        return Ok(());
    }

    let config = commands::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Export {
            api,
            license_uid,
            out_directory,
            extend_scopes,
            since,
            params,
            warehouse,
            progress_bar,
        } => commands::cmd_export(
            &config,
            api.api_key.as_deref(),
            &license_uid,
            &out_directory,
            extend_scopes,
            since.as_deref(),
            params,
            warehouse.as_deref(),
            progress_bar,
        ),

        Commands::Update {
            api,
            license_uid,
            input,
            key_field,
            no_standard,
            no_custom,
            tag_path_terms,
        } => commands::cmd_update(
            &config,
            api.api_key.as_deref(),
            &license_uid,
            &input,
            &key_field,
            !no_standard,
            !no_custom,
            tag_path_terms,
        ),

        Commands::Copy {
            transfer:
                TransferArgs {
                    api,
                    license_uid,
                    schema,
                    source,
                    target,
                },
        } => commands::cmd_copy(
            &config,
            api.api_key.as_deref(),
            &license_uid,
            &schema,
            &source,
            &target,
        ),

        Commands::Merge {
            transfer:
                TransferArgs {
                    api,
                    license_uid,
                    schema,
                    source,
                    target,
                },
            dry_run,
        } => commands::cmd_merge(
            &config,
            api.api_key.as_deref(),
            &license_uid,
            &schema,
            &source,
            &target,
            dry_run,
        ),

        Commands::Taxonomies { api, license_uid } => {
            commands::cmd_taxonomies(&config, api.api_key.as_deref(), &license_uid)
        }

        Commands::Values { api, license_uid } => {
            commands::cmd_values(&config, api.api_key.as_deref(), &license_uid)
        }

        Commands::Completions { .. } => Ok(()),
    }
}
