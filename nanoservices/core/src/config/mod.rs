pub mod loader;
pub mod types;

pub use loader::{load_config, parse_config, parse_duration, ConfigError};
pub use types::{EngineConfig, HistoryConfig, ObjectStoreConfig, SourceConfig, WarehouseConfig};
