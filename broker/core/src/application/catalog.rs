// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service catalog sources for the broker.

use crate::domain::binding::Service;

pub trait ServiceCatalog: Send + Sync {
    fn list(&self) -> Vec<Service>;

    fn find(&self, service_id: &str) -> Option<Service> {
        self.list().into_iter().find(|s| s.id == service_id)
    }
}

/// Catalog fixed at construction, typically from the config manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticServiceCatalog {
    services: Vec<Service>,
}

impl StaticServiceCatalog {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }
}

impl ServiceCatalog for StaticServiceCatalog {
    fn list(&self) -> Vec<Service> {
        self.services.clone()
    }
}
