//! Infrastructure layer: entity store backends, ledger engine, family registry, config.

pub mod config;
pub mod engine;
pub mod family;
pub mod store;

mod integration_tests;

pub use config::{AppConfig, ConfigError, LedgerConfig};
pub use engine::{LedgerEngine, LedgerError, NewDeed, NewRedemption};
pub use family::{ChildUpdate, DeedTypeUpdate, FamilyRegistry};
pub use store::{
    EntityStore, FamilyStore, InMemoryStore, LedgerSnapshot, LedgerStore, PostgresStore,
    StoreError,
};
