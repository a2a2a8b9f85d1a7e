use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    repository::{MemoryStore, PgStore, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    /// unit_id -> landlord_id
    pub ownership_cache: Cache<Uuid, Uuid>,
    pub db_pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = match config.database_url.as_deref() {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(config.db_pool_max_connections)
                    .min_connections(config.db_pool_min_connections)
                    .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
                    .connect_lazy(url)?,
            ),
            None => None,
        };

        let store: Arc<dyn Store> = match &db_pool {
            Some(pool) => Arc::new(PgStore::new(pool.clone())),
            None => {
                tracing::warn!("DATABASE_URL is not set; using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::assemble(config, store, db_pool))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Self {
        Self::assemble(config, store, None)
    }

    fn assemble(config: AppConfig, store: Arc<dyn Store>, db_pool: Option<sqlx::PgPool>) -> Self {
        let ownership_cache = Cache::builder()
            .max_capacity(config.ownership_cache_max_entries)
            .time_to_live(Duration::from_secs(config.ownership_cache_ttl_seconds.max(1)))
            .build();
        Self {
            config: Arc::new(config),
            store,
            ownership_cache,
            db_pool,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::HashMap, sync::Arc};

    use super::AppState;
    use crate::{config::AppConfig, repository::MemoryStore};

    /// In-memory state with dev header auth enabled.
    pub fn state() -> (AppState, Arc<MemoryStore>) {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DEV_AUTH_OVERRIDES_ENABLED", "true"),
            ("SCHEDULER_ENABLED", "false"),
            ("RATE_LIMIT_ENABLED", "false"),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));
        let store = Arc::new(MemoryStore::new());
        (AppState::with_store(config, store.clone()), store)
    }
}
