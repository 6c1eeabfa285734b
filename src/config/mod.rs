//! Configuration subsystem: schema, loading, validation, hot reload.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{ContentConfig, DeliveryConfig, InterfaceConfig, VersionConfig, WebConfig};
