//! Bookshelf - company book lending
//!
//! REST JSON API over a shared catalog of books: employees borrow and return
//! copies, administrators manage the inventory.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use clock::{Clock, SystemClock};
use repository::Store;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Build services over `store` using the system clock
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> AppResult<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let services = services::Services::new(store, clock, &config.auth, &config.lending)?;
        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}
