use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use deedbank_infra::{
    AppConfig, EntityStore, FamilyRegistry, InMemoryStore, LedgerConfig, LedgerEngine,
    PostgresStore,
};
use deedbank_ledger::DollarRate;

pub type SharedStore = Arc<dyn EntityStore>;

/// Everything the handlers need, sharing one entity store.
pub struct AppServices {
    pub engine: LedgerEngine<SharedStore>,
    pub registry: FamilyRegistry<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, ledger: LedgerConfig, default_rate: DollarRate) -> Self {
        Self {
            engine: LedgerEngine::with_config(store.clone(), ledger),
            registry: FamilyRegistry::new(store)
                .with_default_rate(default_rate)
                .with_store_timeout(ledger.store_timeout),
        }
    }

    /// In-memory services with default tuning (dev/tests).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            LedgerConfig::default(),
            DollarRate::one(),
        )
    }
}

/// Postgres when `DATABASE_URL` is set (schema bootstrapped), otherwise in-memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.ledger.store_timeout)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("failed to bootstrap database schema")?;
            info!("using Postgres entity store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory entity store");
            Arc::new(InMemoryStore::new())
        }
    };

    Ok(AppServices::new(
        store,
        config.ledger,
        config.default_dollar_per_point,
    ))
}
