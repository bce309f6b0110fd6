use std::sync::Arc;

use config::StorageConfig;
use domain::DurableStore;
use thiserror::Error;

use crate::{
    broadcast::LocalDeliveryHub, identity::SessionIdentityResolver, memory::InMemoryChatLogStore,
    migrations::MIGRATOR, repository::create_pg_pool, repository::PgChatLogStore,
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    /// 为空时使用内存存储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub broadcast_capacity: usize,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            broadcast_capacity: 1024,
        }
    }
}

impl From<&StorageConfig> for InfrastructureConfig {
    fn from(storage: &StorageConfig) -> Self {
        Self {
            database_url: storage.database_url.clone(),
            max_connections: storage.max_connections,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub store: Arc<dyn DurableStore>,
    pub identity: Arc<SessionIdentityResolver>,
    pub delivery: Arc<LocalDeliveryHub>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let store: Arc<dyn DurableStore> = match &config.database_url {
            Some(url) => {
                let pool = create_pg_pool(url, config.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!("Using PostgreSQL chat log store");
                Arc::new(PgChatLogStore::new(pool))
            }
            None => {
                tracing::warn!("No database configured, chat logs are kept in memory only");
                Arc::new(InMemoryChatLogStore::new())
            }
        };

        Ok(Self {
            store,
            identity: Arc::new(SessionIdentityResolver::new()),
            delivery: Arc::new(LocalDeliveryHub::new(config.broadcast_capacity)),
        })
    }
}
