use std::sync::Arc;

use tracing::{info, warn};

use shared_config::AppConfig;

use crate::error::DatabaseResult;
use crate::gateway::StorageGateway;
use crate::memory::MemoryGateway;
use crate::postgres::PgGateway;

/// Shared handler state: configuration plus the storage gateway every cell talks to.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn StorageGateway>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, gateway: Arc<dyn StorageGateway>) -> Self {
        Self { config, gateway }
    }

    /// Connects to PostgreSQL when `DATABASE_URL` is set, otherwise falls back to the in-memory store.
    pub async fn from_config(config: AppConfig) -> DatabaseResult<Self> {
        let gateway: Arc<dyn StorageGateway> = if config.uses_database() {
            let pg = PgGateway::connect(&config).await?;
            if config.run_migrations {
                pg.run_migrations().await?;
            }
            Arc::new(pg)
        } else {
            warn!("DATABASE_URL not set; using in-memory storage (data is lost on restart)");
            Arc::new(MemoryGateway::new())
        };

        info!("Storage backend: {}", gateway.backend_name());

        Ok(Self::new(Arc::new(config), gateway))
    }

    /// State backed by the given in-memory gateway, for tests.
    pub fn in_memory(config: AppConfig, gateway: MemoryGateway) -> Self {
        Self::new(Arc::new(config), Arc::new(gateway))
    }
}
