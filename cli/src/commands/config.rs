// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use volbroker_core::domain::broker_config::BrokerConfigManifest;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./volbroker-config.yaml)
        #[arg(short, long, default_value = "./volbroker-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = BrokerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if as_yaml {
        let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
        print!("{yaml}");
        return Ok(());
    }

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. VOLBROKER_CONFIG_PATH: {}",
            std::env::var("VOLBROKER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./volbroker-config.yaml");
        println!("  4. ~/.volbroker/config.yaml");
        println!("  5. /etc/volbroker/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Broker:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Kind: {} ({})", config.spec.broker, config.spec.broker.driver_name());
    match &config.spec.store.snapshot_path {
        Some(path) => println!("  Snapshot: {}", path.display()),
        None => println!("  Snapshot: {}", "(in-memory only)".dimmed()),
    }
    println!();

    let options = &config.spec.mount_options;
    let policy = config.policy();
    println!("{}", "Mount Options:".bold());
    println!("  Allowed: {}", join_or_none(options.allowed.iter()));
    println!(
        "  Defaults: {}",
        join_or_none(policy.defaults().iter().map(|(k, v)| format!("{k}={v}")))
    );
    println!(
        "  Forced: {}",
        join_or_none(policy.forced().iter().map(|(k, v)| format!("{k}={v}")))
    );
    println!(
        "  Aliases: {}",
        join_or_none(options.aliases.iter().map(|(k, v)| format!("{k} → {v}")))
    );
    println!("  Sloppy: {}", policy.sloppy());
    println!("  Immutable at bind: {}", join_or_none(options.immutable_at_bind.iter()));
    println!();

    println!("{}", "Services:".bold());
    for service in &config.spec.services {
        println!("  {} ({})", service.name.bold(), service.id);
        println!("    Plans: {}", service.plans.len());
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BrokerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn join_or_none<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
