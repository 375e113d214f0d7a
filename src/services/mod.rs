//! Business logic services

pub mod catalog;
pub mod coordinator;
pub mod ledger;
pub mod loans;

use std::sync::Arc;

use crate::{config::LoansConfig, error::AppResult, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub coordinator: coordinator::Coordinator,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    store: Arc<dyn Store>,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self {
            coordinator: coordinator::Coordinator::new(store.clone(), policy),
            catalog: catalog::CatalogService::new(store.clone(), policy),
            loans: loans::LoansService::new(store.clone(), policy),
            store,
        }
    }

    /// Readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
