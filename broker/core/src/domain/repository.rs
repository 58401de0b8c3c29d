// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broker Store Interface
//!
//! Persistence contract for service instances and bindings. The broker holds
//! one store and calls [`BrokerStore::save`] after every mutating operation;
//! implementations decide whether that is a no-op or a durable write.
//!
//! Conflict checks answer "does this id already exist with *different*
//! details". Re-submitting identical details is not a conflict.
//!
//! Implemented by `crate::infrastructure::repositories::InMemoryBrokerStore`.

use async_trait::async_trait;

use crate::domain::binding::{BindDetails, ServiceInstance};

#[async_trait]
pub trait BrokerStore: Send + Sync {
    /// Load previously saved state.
    async fn restore(&self) -> Result<(), RepositoryError>;

    /// Persist current state.
    async fn save(&self) -> Result<(), RepositoryError>;

    async fn create_instance_details(
        &self,
        instance_id: &str,
        details: ServiceInstance,
    ) -> Result<(), RepositoryError>;

    async fn retrieve_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<ServiceInstance, RepositoryError>;

    async fn delete_instance_details(&self, instance_id: &str) -> Result<(), RepositoryError>;

    async fn create_binding_details(
        &self,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<(), RepositoryError>;

    async fn retrieve_binding_details(
        &self,
        binding_id: &str,
    ) -> Result<BindDetails, RepositoryError>;

    async fn delete_binding_details(&self, binding_id: &str) -> Result<(), RepositoryError>;

    /// True when `instance_id` exists with details other than `details`.
    async fn is_instance_conflict(&self, instance_id: &str, details: &ServiceInstance) -> bool;

    /// True when `binding_id` exists with details other than `details`.
    async fn is_binding_conflict(&self, binding_id: &str, details: &BindDetails) -> bool;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
