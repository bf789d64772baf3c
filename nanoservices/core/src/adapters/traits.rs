use std::collections::BTreeMap;

use async_trait::async_trait;
use medallion_utils::{MedallionResult, Table};
use serde::Serialize;

use crate::asset::key::AssetKey;
use crate::asset::materialization::Materialization;

/// Free-form metadata attached to a stored artifact.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Read-only access to an operational store.
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Run a parameterless read query. Either every row comes back or the
    /// call fails with an extraction error.
    async fn extract(&self, query: &str) -> MedallionResult<Table>;
}

/// Read/write store for intermediate tables, one artifact per asset key.
#[async_trait]
pub trait ObjectMaterializer: Send + Sync {
    fn name(&self) -> &str;

    /// Deterministic artifact location for `key`.
    fn location(&self, key: &AssetKey) -> String;

    /// Replace the artifact for `key`. Readers see either the old or the new
    /// artifact, and the old one survives a failed write.
    async fn store(
        &self,
        key: &AssetKey,
        table: &Table,
        metadata: &Metadata,
    ) -> MedallionResult<Materialization>;

    /// Read the artifact for `key`, failing with `MaterializationNotFound`
    /// if none has been stored.
    async fn load(&self, key: &AssetKey) -> MedallionResult<Table>;
}

/// Outcome of a warehouse full-replace load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub target: String,
    pub rows_loaded: usize,
    pub columns: Vec<String>,
}

/// Write-only loader for curated analytical tables.
#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    fn name(&self) -> &str;

    /// Replace `<schema>.<table>` with `data` in a single transaction.
    async fn load_table(&self, schema: &str, table: &str, data: &Table) -> MedallionResult<LoadResult>;
}
