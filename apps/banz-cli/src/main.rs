//! # Banz CLI
//!
//! Command line front end for the Banz point of sale.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()         logs to stderr, RUST_LOG overrides          │
//! │  2. Cli::parse()           clap derive                                 │
//! │  3. BanzConfig::load()     banz.toml + BANZ_* env                      │
//! │  4. BanzServices::open()   local DB (queue, mirror), remote store      │
//! │  5. commands::run()        one subcommand                              │
//! │  6. services.close()                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! stdout carries results only, so `--json` output can be piped.

mod args;
mod cli;
mod commands;
mod error;
mod output;
mod prompt;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use banz_sync::{AlwaysConfirm, BanzConfig, BanzServices, ConnectivityMode, OperatorPrompt};

use crate::cli::Cli;
use crate::commands::App;
use crate::error::ApiError;
use crate::output::Printer;
use crate::prompt::TerminalPrompt;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let out = Printer::new(cli.json);

    match start(cli, out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            out.error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn start(cli: Cli, out: Printer) -> Result<(), ApiError> {
    let mut config = BanzConfig::load(cli.config)?;
    if cli.offline {
        config.sync.mode = ConnectivityMode::Offline;
    }
    debug!(mode = %config.sync.mode, "Configuration loaded");

    let prompt: Arc<dyn OperatorPrompt> = if cli.yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(TerminalPrompt)
    };

    let services = BanzServices::open(config, prompt).await?;
    info!("Services ready");

    let app = App { services, out };
    let result = commands::run(&app, cli.command).await;
    app.services.close().await;
    result
}

/// Initializes the tracing subscriber for logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` for development
/// - `RUST_LOG=info` for production
/// - `RUST_LOG=banz_sync=trace` for one crate
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,banz_sync=info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
