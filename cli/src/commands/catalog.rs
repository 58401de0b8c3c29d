// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service catalog listing

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use volbroker_core::application::catalog::{ServiceCatalog, StaticServiceCatalog};
use volbroker_core::domain::binding::Service;
use volbroker_core::domain::broker_config::BrokerConfigManifest;

#[derive(Args, Debug, Default)]
pub struct CatalogArgs {
    /// Print the catalog as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: CatalogArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = BrokerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let catalog = StaticServiceCatalog::new(config.spec.services.clone());
    let services = catalog.list();

    if args.json {
        let json = serde_json::to_string_pretty(&services).context("Failed to render catalog")?;
        println!("{json}");
        return Ok(());
    }

    if services.is_empty() {
        println!("{}", "No services configured.".yellow());
        return Ok(());
    }

    for service in &services {
        print_service(service);
    }

    Ok(())
}

fn print_service(service: &Service) {
    println!("{} ({})", service.name.bold(), service.id.dimmed());
    println!("  {}", service.description);
    if !service.tags.is_empty() {
        println!("  Tags: {}", service.tags.join(", "));
    }
    println!("  Bindable: {}", service.bindable);
    for plan in &service.plans {
        println!("  - {} [{}]: {}", plan.name.cyan(), plan.id, plan.description);
    }
    println!();
}
