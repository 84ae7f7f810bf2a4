//! Business logic services

pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod lending;

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::{AuthConfig, LendingConfig},
    error::{AppError, AppResult},
    repository::Store,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub inventory: inventory::InventoryService,
    pub lending: lending::LendingService,
    pub catalog: catalog::CatalogService,
    store: Arc<dyn Store>,
}

impl Services {
    /// Create all services over one store
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        auth_config: &AuthConfig,
        lending_config: &LendingConfig,
    ) -> AppResult<Self> {
        let loan_period = chrono::Duration::try_days(lending_config.loan_period_days)
            .ok_or_else(|| AppError::Internal("lending.loan_period_days is out of range".to_string()))?;

        Ok(Self {
            auth: auth::AuthService::new(auth_config)?,
            inventory: inventory::InventoryService::new(store.clone(), clock.clone()),
            lending: lending::LendingService::new(store.clone(), clock.clone(), loan_period),
            catalog: catalog::CatalogService::new(store.clone(), clock),
            store,
        })
    }

    /// Check that the store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
