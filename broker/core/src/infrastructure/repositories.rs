// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory broker store with an optional JSON snapshot file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::binding::{BindDetails, ServiceInstance};
use crate::domain::repository::{BrokerStore, RepositoryError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreSnapshot {
    #[serde(default)]
    instances: HashMap<String, ServiceInstance>,
    #[serde(default)]
    bindings: HashMap<String, BindDetails>,
}

#[derive(Clone, Default)]
pub struct InMemoryBrokerStore {
    instances: Arc<RwLock<HashMap<String, ServiceInstance>>>,
    bindings: Arc<RwLock<HashMap<String, BindDetails>>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryBrokerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that writes its state to `path` on save and reads it back on
    /// restore.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn binding_count(&self) -> usize {
        self.bindings.read().await.len()
    }
}

#[async_trait]
impl BrokerStore for InMemoryBrokerStore {
    async fn restore(&self) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "no broker snapshot to restore");
            return Ok(());
        }

        let bytes = tokio::fs::read(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            instances = snapshot.instances.len(),
            bindings = snapshot.bindings.len(),
            "restored broker state"
        );

        *self.instances.write().await = snapshot.instances;
        *self.bindings.write().await = snapshot.bindings;
        Ok(())
    }

    async fn save(&self) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let snapshot = StoreSnapshot {
            instances: self.instances.read().await.clone(),
            bindings: self.bindings.read().await.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "saved broker state");
        Ok(())
    }

    async fn create_instance_details(
        &self,
        instance_id: &str,
        details: ServiceInstance,
    ) -> Result<(), RepositoryError> {
        self.instances.write().await.insert(instance_id.to_string(), details);
        Ok(())
    }

    async fn retrieve_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<ServiceInstance, RepositoryError> {
        self.instances
            .read()
            .await
            .get(instance_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("instance {instance_id}")))
    }

    async fn delete_instance_details(&self, instance_id: &str) -> Result<(), RepositoryError> {
        self.instances
            .write()
            .await
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("instance {instance_id}")))
    }

    async fn create_binding_details(
        &self,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<(), RepositoryError> {
        self.bindings.write().await.insert(binding_id.to_string(), details);
        Ok(())
    }

    async fn retrieve_binding_details(
        &self,
        binding_id: &str,
    ) -> Result<BindDetails, RepositoryError> {
        self.bindings
            .read()
            .await
            .get(binding_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("binding {binding_id}")))
    }

    async fn delete_binding_details(&self, binding_id: &str) -> Result<(), RepositoryError> {
        self.bindings
            .write()
            .await
            .remove(binding_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("binding {binding_id}")))
    }

    async fn is_instance_conflict(&self, instance_id: &str, details: &ServiceInstance) -> bool {
        self.instances
            .read()
            .await
            .get(instance_id)
            .is_some_and(|existing| existing != details)
    }

    async fn is_binding_conflict(&self, binding_id: &str, details: &BindDetails) -> bool {
        self.bindings
            .read()
            .await
            .get(binding_id)
            .is_some_and(|existing| existing != details)
    }
}
