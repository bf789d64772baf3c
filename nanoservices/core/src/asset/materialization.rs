use chrono::{DateTime, Utc};
use serde::Serialize;

use medallion_utils::Table;

use crate::asset::key::AssetKey;

/// The durable output of one successful asset execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Materialization {
    pub key: AssetKey,
    pub storage_location: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Materialization {
    pub fn new(key: AssetKey, storage_location: impl Into<String>, table: &Table) -> Self {
        Self {
            key,
            storage_location: storage_location.into(),
            row_count: table.num_rows(),
            columns: table.column_names(),
            created_at: Utc::now(),
        }
    }
}
