// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dry-run bind resolution
//!
//! Provisions a throwaway instance in an in-memory store, binds it, and
//! prints the binding response. The configured snapshot file is never
//! touched.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use volbroker_core::application::broker::{ExistingVolumeBroker, ServiceBroker};
use volbroker_core::application::catalog::StaticServiceCatalog;
use volbroker_core::domain::binding::{BindDetails, Binding, ProvisionDetails};
use volbroker_core::domain::broker_config::BrokerConfigManifest;
use volbroker_core::infrastructure::repositories::InMemoryBrokerStore;

const CLI_APP_GUID: &str = "volbroker-cli";

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Service instance id used for the volume id and default mount path
    #[arg(long, default_value = "volbroker-instance")]
    pub instance_id: String,

    /// Provision parameters as a JSON object (must contain "share")
    #[arg(long, value_name = "JSON")]
    pub fingerprint: String,

    /// Bind parameters as a JSON object
    #[arg(long, value_name = "JSON", default_value = "")]
    pub params: String,

    /// Catalog service to provision against (default: first configured)
    #[arg(long)]
    pub service_id: Option<String>,
}

pub async fn execute(args: ResolveArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = BrokerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let binding = resolve(&config, &args).await?;
    let json = serde_json::to_string_pretty(&binding).context("Failed to render binding")?;

    eprintln!(
        "{}",
        format!("✓ Resolved {} mount for {}", config.spec.broker, args.instance_id).green()
    );
    println!("{json}");
    Ok(())
}

pub async fn resolve(config: &BrokerConfigManifest, args: &ResolveArgs) -> Result<Binding> {
    let service_id = match &args.service_id {
        Some(id) => id.clone(),
        None => config
            .spec
            .services
            .first()
            .map(|s| s.id.clone())
            .ok_or_else(|| anyhow!("No services configured"))?,
    };
    let plan_id = config
        .spec
        .services
        .iter()
        .find(|s| s.id == service_id)
        .and_then(|s| s.plans.first())
        .map(|p| p.id.clone())
        .unwrap_or_default();
    tracing::debug!(service_id = %service_id, plan_id = %plan_id, "resolving dry-run binding");

    let broker = ExistingVolumeBroker::new(
        config.spec.broker,
        Arc::new(StaticServiceCatalog::new(config.spec.services.clone())),
        Arc::new(InMemoryBrokerStore::new()),
        config.policy(),
    )
    .await;

    broker
        .provision(
            &args.instance_id,
            ProvisionDetails {
                service_id: service_id.clone(),
                plan_id: plan_id.clone(),
                raw_parameters: args.fingerprint.clone(),
                ..Default::default()
            },
            false,
        )
        .await
        .context("Provision rejected")?;

    let binding = broker
        .bind(
            &args.instance_id,
            &format!("{}-binding", args.instance_id),
            BindDetails {
                app_guid: CLI_APP_GUID.to_string(),
                plan_id,
                service_id,
                raw_parameters: args.params.clone(),
            },
        )
        .await
        .context("Bind rejected")?;

    Ok(binding)
}
