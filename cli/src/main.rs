// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # volbroker CLI
//!
//! Operator tooling for the existing-volume broker.
//!
//! ## Commands
//!
//! - `volbroker config show|validate|generate` - Configuration management
//! - `volbroker catalog` - List the advertised services
//! - `volbroker resolve` - Dry-run a provision and bind, printing the binding

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use volbroker::commands::{self, CatalogArgs, ConfigCommand, ResolveArgs};
use volbroker::proxy;

/// Service broker for existing NFS and SMB shares
#[derive(Parser)]
#[command(name = "volbroker")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "VOLBROKER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "VOLBROKER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// List the service catalog
    #[command(name = "catalog")]
    Catalog(CatalogArgs),

    /// Resolve the volume mount a bind would produce
    #[command(name = "resolve")]
    Resolve(ResolveArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;
    proxy::detect_proxy(|key| std::env::var(key).ok());

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Catalog(args)) => commands::catalog::execute(args, cli.config).await,
        Some(Commands::Resolve(args)) => commands::resolve::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
