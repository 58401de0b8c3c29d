// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Existing Volume Broker Application Service
//!
//! Implements the service broker lifecycle for shares that already exist:
//! - Provision: record the share and its parameters as a service instance
//! - Bind: resolve a volume mount for an application
//! - Unbind / Deprovision: forget the records
//!
//! Every operation runs under one async lock and ends with a store save.
//! Nothing is created on the file server itself.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::catalog::ServiceCatalog;
use crate::application::mount_resolution::{BindContext, MountResolver, ResolutionError};
use crate::domain::binding::{
    BindDetails, Binding, BrokerKind, DeprovisionDetails, DeprovisionServiceSpec,
    ProvisionDetails, ProvisionedServiceSpec, Service, ServiceInstance, UnbindDetails,
    UpdateDetails, EXPERIMENTAL_TAG,
};
use crate::domain::option_policy::{OptionPolicy, SHARE_KEY};
use crate::domain::option_value::{normalize, RawOptions};
use crate::domain::repository::{BrokerStore, RepositoryError};

/// Operation data handed back from deprovision.
pub const DEPROVISION_OPERATION: &str = "deprovision";

/// An NFS share written as `server:/path`.
static NFS_COLON_SHARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[^/]+:/").expect("NFS share pattern is a valid regex"));

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("parameters are not a valid JSON object")]
    RawParamsInvalid,

    #[error("config requires a \"share\" key")]
    MissingShare,

    #[error("syntax error for share: no colon allowed after server")]
    ShareSyntax,

    #[error("instance already exists")]
    InstanceAlreadyExists,

    #[error("instance does not exist")]
    InstanceDoesNotExist,

    #[error("binding already exists")]
    BindingAlreadyExists,

    #[error("binding does not exist")]
    BindingDoesNotExist,

    #[error("app guid not provided")]
    AppGuidNotProvided,

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Store(#[from] RepositoryError),

    #[error("This service does not support instance updates. Please delete your service instance and create a new one with updated configuration.")]
    UpdateNotSupported,

    #[error("unrecognized operationData")]
    UnrecognizedOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastOperation {
    pub state: OperationState,
    pub description: String,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait ServiceBroker: Send + Sync {
    async fn services(&self) -> Vec<Service>;

    async fn provision(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
        async_allowed: bool,
    ) -> Result<ProvisionedServiceSpec, BrokerError>;

    async fn deprovision(
        &self,
        instance_id: &str,
        details: DeprovisionDetails,
        async_allowed: bool,
    ) -> Result<DeprovisionServiceSpec, BrokerError>;

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Binding, BrokerError>;

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: UnbindDetails,
    ) -> Result<(), BrokerError>;

    async fn update(
        &self,
        instance_id: &str,
        details: UpdateDetails,
        async_allowed: bool,
    ) -> Result<(), BrokerError>;

    async fn last_operation(
        &self,
        instance_id: &str,
        operation_data: &str,
    ) -> Result<LastOperation, BrokerError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct ExistingVolumeBroker {
    kind: BrokerKind,
    catalog: Arc<dyn ServiceCatalog>,
    store: Arc<dyn BrokerStore>,
    policy: OptionPolicy,
    lock: Mutex<()>,
}

impl ExistingVolumeBroker {
    /// Build a broker and load whatever state the store already holds. A
    /// failed restore is logged and the broker starts empty.
    pub async fn new(
        kind: BrokerKind,
        catalog: Arc<dyn ServiceCatalog>,
        store: Arc<dyn BrokerStore>,
        policy: OptionPolicy,
    ) -> Self {
        if let Err(e) = store.restore().await {
            warn!(error = %e, "failed to restore broker state");
        }

        Self {
            kind,
            catalog,
            store,
            policy,
            lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> BrokerKind {
        self.kind
    }

    pub fn policy(&self) -> &OptionPolicy {
        &self.policy
    }

    /// Save after an operation. A save failure only surfaces when the
    /// operation itself succeeded.
    async fn persist<T>(&self, result: Result<T, BrokerError>) -> Result<T, BrokerError> {
        let saved = self.store.save().await;
        match (result, saved) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                warn!(error = %e, "failed to save broker state");
                Err(BrokerError::Store(e))
            }
            (Err(e), Err(save_err)) => {
                warn!(error = %save_err, "failed to save broker state");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    fn is_experimental(&self, service_id: &str) -> bool {
        self.catalog
            .find(service_id)
            .map(|service| service.has_tag(EXPERIMENTAL_TAG))
            .unwrap_or(false)
    }

    async fn provision_locked(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
    ) -> Result<ProvisionedServiceSpec, BrokerError> {
        let fingerprint = parse_parameters(&details.raw_parameters)?;

        let share = fingerprint
            .get(SHARE_KEY)
            .map(|value| normalize(SHARE_KEY, value))
            .unwrap_or_default();
        if share.is_empty() {
            return Err(BrokerError::MissingShare);
        }
        if self.kind == BrokerKind::Nfs && has_colon_after_server(&share) {
            return Err(BrokerError::ShareSyntax);
        }

        let instance = ServiceInstance {
            service_id: details.service_id,
            plan_id: details.plan_id,
            organization_guid: details.organization_guid,
            space_guid: details.space_guid,
            service_fingerprint: fingerprint,
        };

        if self.store.is_instance_conflict(instance_id, &instance).await {
            return Err(BrokerError::InstanceAlreadyExists);
        }

        self.store.create_instance_details(instance_id, instance).await?;
        info!(instance_id, share = %share, "provisioned service instance");
        Ok(ProvisionedServiceSpec { is_async: false })
    }

    async fn deprovision_locked(
        &self,
        instance_id: &str,
    ) -> Result<DeprovisionServiceSpec, BrokerError> {
        self.retrieve_instance(instance_id).await?;
        self.store.delete_instance_details(instance_id).await?;
        info!(instance_id, "deprovisioned service instance");

        Ok(DeprovisionServiceSpec {
            is_async: false,
            operation_data: DEPROVISION_OPERATION.to_string(),
        })
    }

    async fn bind_locked(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Binding, BrokerError> {
        let instance = self.retrieve_instance(instance_id).await?;

        if details.app_guid.is_empty() {
            return Err(BrokerError::AppGuidNotProvided);
        }

        let bind_parameters = parse_bind_parameters(&details.raw_parameters)?;

        if self.store.is_binding_conflict(binding_id, &details).await {
            return Err(BrokerError::BindingAlreadyExists);
        }

        let context = BindContext {
            kind: self.kind,
            instance_id,
            fingerprint: &instance.service_fingerprint,
            bind_parameters: &bind_parameters,
            experimental: self.is_experimental(&instance.service_id),
        };
        let mount = MountResolver::new(&self.policy).resolve(&context)?;
        let volume_id = mount.volume_id();

        self.store.create_binding_details(binding_id, details).await?;
        info!(
            instance_id,
            binding_id,
            volume_id = %volume_id,
            mode = %mount.mode,
            "bound service instance"
        );

        Ok(mount.into_binding())
    }

    async fn unbind_locked(&self, instance_id: &str, binding_id: &str) -> Result<(), BrokerError> {
        self.retrieve_instance(instance_id).await?;

        match self.store.retrieve_binding_details(binding_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound(_)) => return Err(BrokerError::BindingDoesNotExist),
            Err(e) => return Err(e.into()),
        }

        self.store.delete_binding_details(binding_id).await?;
        info!(instance_id, binding_id, "unbound service instance");
        Ok(())
    }

    async fn retrieve_instance(&self, instance_id: &str) -> Result<ServiceInstance, BrokerError> {
        match self.store.retrieve_instance_details(instance_id).await {
            Ok(instance) => Ok(instance),
            Err(RepositoryError::NotFound(_)) => Err(BrokerError::InstanceDoesNotExist),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ServiceBroker for ExistingVolumeBroker {
    async fn services(&self) -> Vec<Service> {
        debug!(kind = %self.kind, "listing services");
        self.catalog.list()
    }

    async fn provision(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
        _async_allowed: bool,
    ) -> Result<ProvisionedServiceSpec, BrokerError> {
        let _guard = self.lock.lock().await;
        let result = self.provision_locked(instance_id, details).await;
        self.persist(result).await
    }

    async fn deprovision(
        &self,
        instance_id: &str,
        _details: DeprovisionDetails,
        _async_allowed: bool,
    ) -> Result<DeprovisionServiceSpec, BrokerError> {
        let _guard = self.lock.lock().await;
        let result = self.deprovision_locked(instance_id).await;
        self.persist(result).await
    }

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Binding, BrokerError> {
        let _guard = self.lock.lock().await;
        let result = self.bind_locked(instance_id, binding_id, details).await;
        if let Err(e) = &result {
            debug!(instance_id, binding_id, error = %e, "bind rejected");
        }
        self.persist(result).await
    }

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _details: UnbindDetails,
    ) -> Result<(), BrokerError> {
        let _guard = self.lock.lock().await;
        let result = self.unbind_locked(instance_id, binding_id).await;
        self.persist(result).await
    }

    async fn update(
        &self,
        instance_id: &str,
        _details: UpdateDetails,
        _async_allowed: bool,
    ) -> Result<(), BrokerError> {
        debug!(instance_id, "update requested");
        Err(BrokerError::UpdateNotSupported)
    }

    async fn last_operation(
        &self,
        instance_id: &str,
        operation_data: &str,
    ) -> Result<LastOperation, BrokerError> {
        let _guard = self.lock.lock().await;
        debug!(instance_id, operation_data, "last operation requested");
        Err(BrokerError::UnrecognizedOperation)
    }
}

/// Parameters must be a JSON object; anything else is rejected.
fn parse_parameters(raw: &str) -> Result<RawOptions, BrokerError> {
    serde_json::from_str::<RawOptions>(raw).map_err(|_| BrokerError::RawParamsInvalid)
}

/// Bind parameters are optional: empty text and JSON `null` mean none.
fn parse_bind_parameters(raw: &str) -> Result<RawOptions, BrokerError> {
    if raw.trim().is_empty() {
        return Ok(RawOptions::new());
    }
    serde_json::from_str::<Option<RawOptions>>(raw)
        .map(Option::unwrap_or_default)
        .map_err(|_| BrokerError::RawParamsInvalid)
}

fn has_colon_after_server(share: &str) -> bool {
    NFS_COLON_SHARE.is_match(share)
}
