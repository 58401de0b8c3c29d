// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Service Broker Types
//!
//! Service instances, bindings and the catalog, shaped after the service
//! broker API so they serialize straight into protocol responses.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mode::AccessMode;
use super::option_value::RawOptions;
use super::options_merger::OptionSet;

/// Default parent directory of application mount points.
pub const DEFAULT_CONTAINER_PATH: &str = "/var/vcap/data";

/// Service tag that marks experimental NFS offerings.
pub const EXPERIMENTAL_TAG: &str = "experimental";

/// Flavour of share a broker exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Nfs,
    Smb,
}

impl BrokerKind {
    /// Volume driver that mounts this kind of share.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::Nfs => "nfsv3driver",
            Self::Smb => "smbdriver",
        }
    }

    /// `source` handed to the driver for a share address. The NFS driver
    /// expects an `nfs://` URL.
    pub fn source_for(&self, share: &str) -> String {
        match self {
            Self::Nfs => format!("nfs://{share}"),
            Self::Smb => share.to_string(),
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nfs => f.write_str("nfs"),
            Self::Smb => f.write_str("smb"),
        }
    }
}

/// Persisted record of a provisioned service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    /// Provision-time parameters, replayed on every bind.
    pub service_fingerprint: RawOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    /// Raw JSON object text as sent by the platform.
    #[serde(default)]
    pub raw_parameters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindDetails {
    #[serde(default)]
    pub app_guid: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub service_id: String,
    /// Raw JSON object text; empty means no parameters.
    #[serde(default)]
    pub raw_parameters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindDetails {
    pub plan_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionDetails {
    pub plan_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub raw_parameters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedServiceSpec {
    pub is_async: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionServiceSpec {
    pub is_async: bool,
    pub operation_data: String,
}

/// Placeholder credentials. The platform rejects a binding whose
/// credentials are null, so this always serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyCredentials {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub credentials: EmptyCredentials,
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub container_dir: String,
    pub mode: AccessMode,
    pub driver: String,
    pub device_type: String,
    pub device: SharedDevice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDevice {
    pub volume_id: String,
    pub mount_config: OptionSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub bindable: bool,
    #[serde(default)]
    pub plan_updatable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_requires")]
    pub requires: Vec<String>,
    #[serde(default)]
    pub plans: Vec<ServicePlan>,
}

impl Service {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

fn default_true() -> bool {
    true
}

fn default_requires() -> Vec<String> {
    vec!["volume_mount".to_string()]
}
