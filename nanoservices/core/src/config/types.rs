use serde::Deserialize;
use std::path::PathBuf;

/// Everything the engine needs to wire its adapters. Durations are strings
/// such as `"5s"`, `"250ms"` or `"2m"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub source: SourceConfig,
    pub object_store: ObjectStoreConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// SQLite database holding the operational tables.
    pub path: PathBuf,
    #[serde(default = "default_source_pool")]
    pub pool_size: usize,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout: String,
    /// Deadline for a single extraction query
    pub query_timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    pub root: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    pub path: PathBuf,
    #[serde(default = "default_warehouse_pool")]
    pub pool_size: usize,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout: String,
}

/// Run history database. In-memory when `path` is absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    pub path: Option<PathBuf>,
}

fn default_workers() -> usize {
    4
}

fn default_source_pool() -> usize {
    4
}

fn default_warehouse_pool() -> usize {
    2
}

fn default_busy_timeout() -> String {
    "5s".to_string()
}

fn default_bucket() -> String {
    "warehouse".to_string()
}
