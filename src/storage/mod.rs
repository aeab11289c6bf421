//! Storage module: activity store and configuration.

pub mod config;
pub mod database;
pub mod schema;
pub mod store;

pub use config::{ConfigError, ExportSettings};
pub use database::SqliteStore;
pub use store::{ActivityStore, MemoryStore, StoreError};
