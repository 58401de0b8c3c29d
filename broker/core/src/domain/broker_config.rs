// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Broker Configuration Types
//
// Defines the configuration schema for a volbroker process, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Broker flavour (nfs or smb)
// - Mount option policy (allow list, operator defaults, aliases, sloppy mode)
// - Store persistence settings
// - Service catalog

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use super::binding::{BrokerKind, Service, ServicePlan};
use super::option_policy::{parse_default_entries, OptionPolicy, SHARE_KEY};

pub const API_VERSION: &str = "volbroker.io/v1";
pub const KIND: &str = "BrokerConfig";

/// Top-level broker configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfigManifest {
    /// API version (must be "volbroker.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BrokerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: BrokerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable broker name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfigSpec {
    /// Share flavour served by this broker
    pub broker: BrokerKind,

    #[serde(default)]
    pub mount_options: MountOptionsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub services: Vec<Service>,
}

/// Operator mount option policy, as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountOptionsConfig {
    /// Option keys callers may set
    #[serde(default)]
    pub allowed: Vec<String>,

    /// Operator defaults. Defaults for allowed keys are overridable, all
    /// others are forced onto every mount.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,

    /// Renames applied to keys in the emitted mount configuration
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Tolerate disallowed options instead of failing the bind
    #[serde(default)]
    pub sloppy: bool,

    /// Keys a bind may not change from the provisioned value
    #[serde(default = "default_immutable_at_bind")]
    pub immutable_at_bind: Vec<String>,
}

impl Default for MountOptionsConfig {
    fn default() -> Self {
        Self {
            allowed: vec![],
            defaults: BTreeMap::new(),
            aliases: BTreeMap::new(),
            sloppy: false,
            immutable_at_bind: default_immutable_at_bind(),
        }
    }
}

impl MountOptionsConfig {
    pub fn to_policy(&self) -> OptionPolicy {
        let mut builder = OptionPolicy::builder()
            .allow(self.allowed.iter().cloned())
            .sloppy(self.sloppy)
            .immutable_at_bind(self.immutable_at_bind.iter().cloned());
        for (key, value) in &self.defaults {
            builder = builder.default_option(key.clone(), value.clone());
        }
        for (key, renamed) in &self.aliases {
            builder = builder.alias(key.clone(), renamed.clone());
        }
        builder.build()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file for instances and bindings. In-memory only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for BrokerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "volbroker".to_string(),
                labels: None,
            },
            spec: BrokerConfigSpec {
                broker: BrokerKind::Nfs,
                mount_options: MountOptionsConfig::default(),
                store: StoreConfig::default(),
                services: vec![default_service(BrokerKind::Nfs)],
            },
        }
    }
}

impl BrokerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. VOLBROKER_CONFIG_PATH environment variable
    /// 2. ./volbroker-config.yaml (working directory)
    /// 3. ~/.volbroker/config.yaml (user home)
    /// 4. /etc/volbroker/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VOLBROKER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./volbroker-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".volbroker").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/volbroker/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration.
    /// Values use the operator flag syntax: `a,b,c` for the allow list and
    /// `key:value,key:value` for defaults.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VOLBROKER_ALLOWED_OPTIONS") {
            tracing::info!("Environment override: VOLBROKER_ALLOWED_OPTIONS={}", val);
            self.spec.mount_options.allowed = val
                .split(',')
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(val) = std::env::var("VOLBROKER_DEFAULT_OPTIONS") {
            tracing::info!("Environment override: VOLBROKER_DEFAULT_OPTIONS={}", val);
            self.spec.mount_options.defaults = parse_default_entries(&val).into_iter().collect();
        }

        if let Ok(val) = std::env::var("VOLBROKER_SNAPSHOT_PATH") {
            tracing::info!("Environment override: VOLBROKER_SNAPSHOT_PATH={}", val);
            self.spec.store.snapshot_path = Some(PathBuf::from(val));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let options = &self.spec.mount_options;
        if let Some(key) = options.allowed.iter().find(|k| k.is_empty()) {
            anyhow::bail!("mount_options.allowed contains an empty key: {:?}", key);
        }
        if options.defaults.keys().any(|k| k.is_empty()) {
            anyhow::bail!("mount_options.defaults contains an empty key");
        }
        if options.aliases.iter().any(|(k, v)| k.is_empty() || v.is_empty()) {
            anyhow::bail!("mount_options.aliases cannot map to or from an empty key");
        }

        let mut seen = HashSet::new();
        for service in &self.spec.services {
            if service.id.is_empty() {
                anyhow::bail!("Service id cannot be empty for: {}", service.name);
            }
            if !seen.insert(service.id.as_str()) {
                anyhow::bail!("Duplicate service id: {}", service.id);
            }
            if service.plans.is_empty() {
                anyhow::bail!("Service must have at least one plan: {}", service.id);
            }
            for plan in &service.plans {
                if plan.id.is_empty() {
                    anyhow::bail!("Plan id cannot be empty in service: {}", service.id);
                }
            }
        }

        Ok(())
    }

    pub fn policy(&self) -> OptionPolicy {
        self.spec.mount_options.to_policy()
    }
}

/// Catalog entry used when the manifest declares no services.
pub fn default_service(kind: BrokerKind) -> Service {
    let (id, name, description) = match kind {
        BrokerKind::Nfs => ("nfs-service-id", "nfs", "Existing NFSv3 volumes"),
        BrokerKind::Smb => ("smb-service-id", "smb", "Existing SMB shares"),
    };
    Service {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        bindable: true,
        plan_updatable: false,
        tags: vec![kind.to_string()],
        requires: vec!["volume_mount".to_string()],
        plans: vec![ServicePlan {
            id: "Existing".to_string(),
            name: "Existing".to_string(),
            description: "A preexisting filesystem".to_string(),
        }],
    }
}

fn default_immutable_at_bind() -> Vec<String> {
    vec![SHARE_KEY.to_string()]
}
