use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};
use tracing::debug;

use crate::adapters::sqlite::query_table;
use crate::adapters::traits::SourceExtractor;
use crate::store::pool::SqlitePool;

/// Reads operational tables out of a SQLite database through read-only
/// connections. Writing statements are refused.
pub struct SqliteExtractor {
    name: String,
    pool: SqlitePool,
    query_timeout: Option<Duration>,
}

impl SqliteExtractor {
    pub fn open(path: impl Into<PathBuf>, pool_size: usize, busy_timeout: Duration) -> Self {
        let path = path.into();
        Self {
            name: format!("sqlite:{}", path.display()),
            pool: SqlitePool::file(path, pool_size, true, busy_timeout),
            query_timeout: None,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl SourceExtractor for SqliteExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, query: &str) -> MedallionResult<Table> {
        let owned = query.to_string();
        let table = self
            .pool
            .run(self.query_timeout, move |conn| query_table(conn, &owned))
            .await
            .map_err(Error::extraction)?
            .map_err(Error::extraction)?;
        debug!(source = %self.name, query, rows = table.num_rows(), "extracted");
        Ok(table)
    }
}
