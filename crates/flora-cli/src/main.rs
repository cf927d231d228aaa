//! flora - command line client for the Flora plant identification backend
//!
//! Uploads images for identification, manages the plant catalog and chats
//! about identification results. Configuration comes from `FLORA_*`
//! environment variables; logs go to stderr, results to stdout.

mod cli;
mod commands;
mod config;
mod error;
mod render;

use crate::cli::Cli;
use crate::config::{Config, LogFormat, API_URL_VAR};
use crate::error::Result;
use clap::Parser;
use flora_api::{ClientOptions, FloraClient};
use flora_store::FloraStore;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

const LOG_TARGETS: [&str; 4] = ["flora_api", "flora_store", "flora_chat", "flora_cli"];

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.api_url.clone() {
        Some(api_url) => Config::from_lookup(|key| {
            if key == API_URL_VAR {
                Some(api_url.clone())
            } else {
                std::env::var(key).ok()
            }
        })?,
        None => Config::from_env()?,
    };
    init_logging(config.log_format)?;
    debug!(
        api_url = %config.api_url,
        family_list_contract = %config.family_list_contract,
        "Configuration loaded"
    );

    let client = FloraClient::new(
        config.api_url.clone(),
        ClientOptions {
            timeout: config.http_timeout,
            family_list_contract: config.family_list_contract,
        },
    )?;
    let store = Arc::new(FloraStore::new(client, config.store_options()));

    commands::dispatch(cli.command, &store, &config.secret_lookup).await
}

fn init_logging(format: LogFormat) -> Result<()> {
    // RUST_LOG wins when set
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let defaults: Vec<String> = LOG_TARGETS.iter().map(|t| format!("{}=info", t)).collect();
        EnvFilter::try_new(defaults.join(","))
    })?;

    match format {
        LogFormat::Stackdriver => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
