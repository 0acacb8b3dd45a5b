pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod rest;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod users;

use std::sync::Arc;

use config::DaemonConfig;
use store::EntityStore;

/// Shared application state passed to every REST handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub store: Arc<dyn EntityStore>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: DaemonConfig, store: Arc<dyn EntityStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            started_at: std::time::Instant::now(),
        }
    }
}
