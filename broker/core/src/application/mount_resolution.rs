// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount Resolution
//!
//! Turns a bind request into the mount specification returned to the
//! platform:
//! - option merge under the operator policy (`OptionsMerger`)
//! - access mode from `readonly` (`mode::evaluate`)
//! - driver `source` and flavour-specific markers
//! - content-derived volume id (`VolumeIdentity`)
//!
//! Resolution is synchronous and side-effect free, so the broker can run it
//! before touching the store.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::binding::{
    BrokerKind, Binding, EmptyCredentials, SharedDevice, VolumeMount, DEFAULT_CONTAINER_PATH,
    EXPERIMENTAL_TAG,
};
use crate::domain::mode::{self, AccessMode, ModeError, READONLY_KEY};
use crate::domain::option_policy::{OptionPolicy, SHARE_KEY};
use crate::domain::option_value::{normalize, RawOptions};
use crate::domain::options_merger::{MergeError, MergeRequest, OptionSet, OptionsMerger};
use crate::domain::volume_identity::VolumeIdentity;

/// Parameter overriding the application's mount point.
pub const MOUNT_KEY: &str = "mount";
/// Kerberos identity fields, consumed by the driver's credential flow.
pub const USERNAME_KEY: &str = "kerberosPrincipal";
pub const SECRET_KEY: &str = "kerberosKeytab";
/// Driver option carrying the share address.
pub const SOURCE_KEY: &str = "source";

/// Keys the broker handles itself rather than through the generic merge.
pub const BIND_IGNORED_KEYS: &[&str] =
    &[SHARE_KEY, MOUNT_KEY, USERNAME_KEY, SECRET_KEY, READONLY_KEY];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("config requires a \"share\" key")]
    MissingShare,

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Mode(#[from] ModeError),
}

/// Everything known about a bind before resolution.
#[derive(Debug, Clone)]
pub struct BindContext<'a> {
    pub kind: BrokerKind,
    pub instance_id: &'a str,
    pub fingerprint: &'a RawOptions,
    pub bind_parameters: &'a RawOptions,
    /// The instance's service carries the experimental tag.
    pub experimental: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub config: OptionSet,
    pub mode: AccessMode,
    pub identity: VolumeIdentity,
    pub container_dir: String,
    pub driver: String,
}

impl ResolvedMount {
    pub fn volume_id(&self) -> String {
        self.identity.volume_id()
    }

    pub fn into_volume_mount(self) -> VolumeMount {
        let volume_id = self.identity.volume_id();
        VolumeMount {
            container_dir: self.container_dir,
            mode: self.mode,
            driver: self.driver,
            device_type: "shared".to_string(),
            device: SharedDevice {
                volume_id,
                mount_config: self.config,
            },
        }
    }

    pub fn into_binding(self) -> Binding {
        Binding {
            credentials: EmptyCredentials::default(),
            volume_mounts: vec![self.into_volume_mount()],
        }
    }
}

pub struct MountResolver<'p> {
    policy: &'p OptionPolicy,
    ignore_keys: BTreeSet<String>,
}

impl<'p> MountResolver<'p> {
    pub fn new(policy: &'p OptionPolicy) -> Self {
        Self {
            policy,
            ignore_keys: BIND_IGNORED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn resolve(&self, ctx: &BindContext<'_>) -> Result<ResolvedMount, ResolutionError> {
        let locator = ctx
            .fingerprint
            .get(SHARE_KEY)
            .map(|value| normalize(SHARE_KEY, value))
            .filter(|share| !share.is_empty())
            .ok_or(ResolutionError::MissingShare)?;

        let combined = combine(ctx.fingerprint, ctx.bind_parameters);
        let mode = mode::evaluate(&combined)?;

        let request = MergeRequest::new(
            self.policy,
            ctx.fingerprint,
            ctx.bind_parameters,
            &locator,
            &self.ignore_keys,
        );
        let outcome = OptionsMerger::new(self.policy).merge(&request)?;

        let mut config = outcome.options;
        mode::apply_read_only_marker(&mut config, mode, self.policy);
        config.insert(SOURCE_KEY.to_string(), ctx.kind.source_for(&outcome.share));
        if ctx.kind == BrokerKind::Nfs && ctx.experimental {
            config.insert(EXPERIMENTAL_TAG.to_string(), "true".to_string());
        }

        let identity = VolumeIdentity::derive(ctx.instance_id, &config);
        tracing::debug!(
            driver = ctx.kind.driver_name(),
            share = %outcome.share,
            volume_id = %identity,
            "resolved volume mount"
        );

        Ok(ResolvedMount {
            config,
            mode,
            identity,
            container_dir: container_dir(&combined, ctx.instance_id),
            driver: ctx.kind.driver_name().to_string(),
        })
    }
}

/// Fingerprint overlaid by bind parameters, raw values untouched.
pub fn combine(fingerprint: &RawOptions, bind_parameters: &RawOptions) -> RawOptions {
    let mut combined = fingerprint.clone();
    combined.extend(bind_parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
    combined
}

/// `mount` parameter if given, otherwise a per-instance default directory.
pub fn container_dir(parameters: &RawOptions, instance_id: &str) -> String {
    parameters
        .get(MOUNT_KEY)
        .map(|value| normalize(MOUNT_KEY, value))
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| format!("{}/{}", DEFAULT_CONTAINER_PATH, instance_id))
}
