//! # Core Client CLI (`corectl`)
//!
//! Terminal front end for the core client. Every command reads the same TOML
//! configuration; a missing file falls back to the built-in defaults.
//!
//! ## Usage
//!
//! ```bash
//! corectl --config ./config/core.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corectl wait` | Bring up central, search and update backends in order |
//! | `corectl status <service>` | Check one service (`central`, `search`, `updates`) |
//! | `corectl search "<query>"` | Search and print one page of results |
//! | `corectl report <hash>` | Print the full report for a record |
//! | `corectl updates` | Start the update job and stream its progress |
//! | `corectl browse` | Interactive search session |
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` to change the
//! level (default `core_client=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use core_client::models::ViewMode;
use core_client::{browse, config, readiness, report, search, updates};

/// Core client CLI for the document search backends.
#[derive(Parser)]
#[command(
    name = "corectl",
    about = "Terminal client for the document search backends",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/core.toml`. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "./config/core.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait until every backend reports ready.
    ///
    /// Initializes the central backend, then waits for the search API, then
    /// for the update API, all within one global timeout.
    Wait,

    /// Check a single service once it is needed.
    Status {
        /// `central`, `search` or `updates`.
        service: String,
    },

    /// Search indexed reports.
    Search {
        /// The search query string.
        query: String,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// `list` or `map`.
        #[arg(long, default_value = "list")]
        view: ViewMode,
    },

    /// Retrieve a full report by its SHA-256 hash.
    Report {
        /// Record hash.
        hash: String,
    },

    /// Start the update process and follow its progress.
    Updates,

    /// Interactive search session.
    Browse,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("core_client=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Wait => {
            readiness::run_wait(&cfg).await?;
        }
        Commands::Status { service } => {
            readiness::run_status(&cfg, &service).await?;
        }
        Commands::Search { query, page, view } => {
            search::run_search(&cfg, &query, page, view).await?;
        }
        Commands::Report { hash } => {
            report::run_report(&cfg, &hash).await?;
        }
        Commands::Updates => {
            updates::run_updates(&cfg).await?;
        }
        Commands::Browse => {
            browse::run_browse(&cfg).await?;
        }
    }

    Ok(())
}
