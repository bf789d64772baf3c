use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};
use rusqlite::TransactionBehavior;
use tracing::info;

use crate::adapters::sqlite::{attach_schema, query_table, quote_ident, replace_table, SqlError};
use crate::adapters::traits::{LoadResult, WarehouseLoader};
use crate::store::pool::SqlitePool;

/// Where the database behind each schema lives.
enum SchemaFiles {
    /// `<dir>/<stem>.<schema>.db` next to the main database file.
    Beside { dir: PathBuf, stem: String },
    Memory,
}

/// SQLite-backed analytical warehouse. Every `<schema>` is its own database
/// attached under that name, so `<schema>.<table>` resolves like a
/// schema-qualified table in a server database.
pub struct SqliteWarehouse {
    name: String,
    pool: SqlitePool,
    schemas: SchemaFiles,
}

impl SqliteWarehouse {
    pub fn open(path: impl Into<PathBuf>, pool_size: usize, busy_timeout: Duration) -> Self {
        let path = path.into();
        let dir = path.parent().map(PathBuf::from).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "warehouse".to_string());
        Self {
            name: format!("sqlite:{}", path.display()),
            pool: SqlitePool::file(path, pool_size, false, busy_timeout),
            schemas: SchemaFiles::Beside { dir, stem },
        }
    }

    /// Single-connection warehouse whose schemas live in memory.
    pub fn in_memory() -> Self {
        Self {
            name: "sqlite::memory:".to_string(),
            pool: SqlitePool::in_memory(),
            schemas: SchemaFiles::Memory,
        }
    }

    fn schema_file(&self, schema: &str) -> Result<String, String> {
        if schema.is_empty() || schema.contains(['/', '\\', '\0']) || schema.contains("..") {
            return Err(format!("invalid schema name '{schema}'"));
        }
        Ok(match &self.schemas {
            SchemaFiles::Beside { dir, stem } => dir.join(format!("{stem}.{schema}.db")).display().to_string(),
            SchemaFiles::Memory => ":memory:".to_string(),
        })
    }

    /// Current contents of `<schema>.<table>`.
    pub async fn read_table(&self, schema: &str, table: &str) -> MedallionResult<Table> {
        let qualified = format!("{schema}.{table}");
        let file = self.schema_file(schema).map_err(Error::extraction)?;
        let schema = schema.to_string();
        let query = format!("SELECT * FROM {}.{}", quote_ident(&schema), quote_ident(table));
        let result = self
            .pool
            .run(None, move |conn| {
                attach_schema(conn, &schema, &file)?;
                query_table(conn, &query)
            })
            .await
            .map_err(Error::extraction)?;
        match result {
            Ok(table) => Ok(table),
            Err(e) if e.is_missing_table() => Err(Error::MaterializationNotFound(qualified)),
            Err(e) => Err(Error::extraction(e)),
        }
    }
}

#[async_trait]
impl WarehouseLoader for SqliteWarehouse {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_table(&self, schema: &str, table: &str, data: &Table) -> MedallionResult<LoadResult> {
        let qualified = format!("{schema}.{table}");
        let file = self.schema_file(schema).map_err(|e| Error::load(&qualified, e))?;
        let schema = schema.to_string();
        let target = format!("{}.{}", quote_ident(&schema), quote_ident(table));
        let rows = data.clone();

        let loaded = self
            .pool
            .run(None, move |conn| {
                attach_schema(conn, &schema, &file)?;
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let inserted = replace_table(&tx, &target, &rows)?;
                tx.commit()?;
                Ok::<_, SqlError>(inserted)
            })
            .await
            .map_err(|e| Error::load(&qualified, e))?
            .map_err(|e| Error::load(&qualified, e))?;

        info!(warehouse = %self.name, target = %qualified, rows = loaded, "table replaced");
        Ok(LoadResult { target: qualified, rows_loaded: loaded, columns: data.column_names() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use medallion_utils::ErrorKind;
    use std::sync::Arc;

    fn summary(rows: &[(&str, f64)]) -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("customer_id", DataType::Utf8, true),
            Field::new("total", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            ],
        )
        .unwrap();
        Table::from_batch(batch)
    }

    #[tokio::test]
    async fn load_replaces_previous_contents() {
        let warehouse = SqliteWarehouse::in_memory();
        warehouse
            .load_table("ecom", "summary", &summary(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]))
            .await
            .unwrap();
        let result = warehouse
            .load_table("ecom", "summary", &summary(&[("d", 4.0)]))
            .await
            .unwrap();

        assert_eq!(result.target, "ecom.summary");
        assert_eq!(result.rows_loaded, 1);
        let current = warehouse.read_table("ecom", "summary").await.unwrap();
        assert_eq!(current, summary(&[("d", 4.0)]));
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_contents() {
        let warehouse = SqliteWarehouse::in_memory();
        warehouse
            .load_table("ecom", "summary", &summary(&[("a", 1.0), ("b", 2.0)]))
            .await
            .unwrap();

        // Duplicate column names make CREATE TABLE fail after the DROP.
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Utf8, true),
            Field::new("x", DataType::Utf8, true),
        ]));
        let bad = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["1"])), Arc::new(StringArray::from(vec!["2"]))],
        )
        .unwrap();
        let err = warehouse
            .load_table("ecom", "summary", &Table::from_batch(bad))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadError);

        let current = warehouse.read_table("ecom", "summary").await.unwrap();
        assert_eq!(current.num_rows(), 2);
    }

    #[tokio::test]
    async fn schemas_are_separate_attached_databases() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = SqliteWarehouse::open(dir.path().join("warehouse.db"), 2, Duration::from_secs(1));
        warehouse
            .load_table("ecom", "summary", &summary(&[("a", 1.0), ("b", 2.0)]))
            .await
            .unwrap();
        warehouse
            .load_table("crm", "summary", &summary(&[("c", 3.0)]))
            .await
            .unwrap();

        let ecom = rusqlite::Connection::open(dir.path().join("warehouse.ecom.db")).unwrap();
        let rows: i64 = ecom.query_row("SELECT count(*) FROM summary", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 2);

        let main = rusqlite::Connection::open(dir.path().join("warehouse.db")).unwrap();
        let tables: i64 = main
            .query_row("SELECT count(*) FROM sqlite_master WHERE type = 'table'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 0);

        assert_eq!(warehouse.read_table("crm", "summary").await.unwrap().num_rows(), 1);
        let err = warehouse.load_table("../x", "summary", &summary(&[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadError);
    }

    #[tokio::test]
    async fn reading_a_missing_table_is_not_found() {
        let warehouse = SqliteWarehouse::in_memory();
        let err = warehouse.read_table("ecom", "nothing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaterializationNotFoundError);
    }
}
