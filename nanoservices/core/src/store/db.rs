use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::asset::materialization::Materialization;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("history worker failed: {0}")]
    Worker(String),
}

/// Run `f` against the shared store on the blocking thread pool.
pub async fn with_store<T, F>(store: &Arc<Mutex<Store>>, f: F) -> Result<T, HistoryError>
where
    F: FnOnce(&Store) -> Result<T, rusqlite::Error> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || {
        let store = store.blocking_lock();
        f(&store)
    })
    .await
    .map_err(|e| HistoryError::Worker(e.to_string()))?;
    Ok(result?)
}

/// SQLite-backed ledger of runs, per-asset outcomes and the latest
/// materialization of every asset.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            );
            CREATE TABLE IF NOT EXISTS asset_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES runs(id),
                asset_key TEXT NOT NULL,
                layer TEXT NOT NULL,
                state TEXT NOT NULL,
                row_count INTEGER,
                storage_location TEXT,
                error_kind TEXT,
                error TEXT,
                duration_ms INTEGER
            );
            CREATE TABLE IF NOT EXISTS materializations (
                asset_key TEXT PRIMARY KEY,
                run_id TEXT,
                storage_location TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                columns TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_asset_runs_run_id ON asset_runs(run_id);",
        )?;
        Ok(())
    }

    /// Record a new run as started.
    pub fn insert_run(&self, id: &str, started_at: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO runs (id, status, started_at) VALUES (?1, 'running', ?2)",
            params![id, started_at],
        )?;
        Ok(())
    }

    pub fn complete_run(
        &self,
        id: &str,
        status: &str,
        finished_at: &str,
        duration_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE runs SET status = ?2, finished_at = ?3, duration_ms = ?4 WHERE id = ?1",
            params![id, status, finished_at, duration_ms],
        )?;
        Ok(())
    }

    /// Record the terminal outcome of one asset within a run.
    pub fn insert_asset_run(&self, record: &AssetRunRow) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO asset_runs
                (run_id, asset_key, layer, state, row_count, storage_location, error_kind, error, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.run_id,
                record.asset_key,
                record.layer,
                record.state,
                record.row_count,
                record.storage_location,
                record.error_kind,
                record.error,
                record.duration_ms,
            ],
        )?;
        Ok(())
    }

    /// Replace the latest materialization of `m.key`.
    pub fn upsert_materialization(&self, run_id: Option<&str>, m: &Materialization) -> Result<(), rusqlite::Error> {
        let columns = serde_json::to_string(&m.columns)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "INSERT INTO materializations (asset_key, run_id, storage_location, row_count, columns, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(asset_key) DO UPDATE SET
                run_id = excluded.run_id,
                storage_location = excluded.storage_location,
                row_count = excluded.row_count,
                columns = excluded.columns,
                created_at = excluded.created_at",
            params![
                m.key.to_string(),
                run_id,
                m.storage_location,
                m.row_count as i64,
                columns,
                m.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn latest_materialization(&self, asset_key: &str) -> Result<Option<MaterializationRow>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT asset_key, run_id, storage_location, row_count, columns, created_at
                 FROM materializations WHERE asset_key = ?1",
                params![asset_key],
                |row| {
                    let columns: String = row.get(4)?;
                    let columns = serde_json::from_str(&columns).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                    })?;
                    Ok(MaterializationRow {
                        asset_key: row.get(0)?,
                        run_id: row.get(1)?,
                        storage_location: row.get(2)?,
                        row_count: row.get(3)?,
                        columns,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    /// Mark in-flight runs as crashed (for crash recovery on startup).
    pub fn mark_inflight_as_crashed(&self) -> Result<usize, rusqlite::Error> {
        let count = self.conn.execute(
            "UPDATE runs SET status = 'crashed' WHERE status = 'running'",
            [],
        )?;
        Ok(count)
    }

    /// Get recent runs, most recent first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status, started_at, finished_at, duration_ms
             FROM runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                status: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                duration_ms: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Asset outcomes of one run in the order they were recorded.
    pub fn asset_runs_for(&self, run_id: &str) -> Result<Vec<AssetRunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, asset_key, layer, state, row_count, storage_location, error_kind, error, duration_ms
             FROM asset_runs WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(AssetRunRow {
                run_id: row.get(0)?,
                asset_key: row.get(1)?,
                layer: row.get(2)?,
                state: row.get(3)?,
                row_count: row.get(4)?,
                storage_location: row.get(5)?,
                error_kind: row.get(6)?,
                error: row.get(7)?,
                duration_ms: row.get(8)?,
            })
        })?;
        rows.collect()
    }
}

#[derive(Debug)]
pub struct RunRow {
    pub id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetRunRow {
    pub run_id: String,
    pub asset_key: String,
    pub layer: String,
    pub state: String,
    pub row_count: Option<i64>,
    pub storage_location: Option<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug)]
pub struct MaterializationRow {
    pub asset_key: String,
    pub run_id: Option<String>,
    pub storage_location: String,
    pub row_count: i64,
    pub columns: Vec<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::key::{AssetKey, Layer};
    use chrono::Utc;

    fn asset_run(run_id: &str, key: &str, state: &str, error: Option<&str>) -> AssetRunRow {
        AssetRunRow {
            run_id: run_id.to_string(),
            asset_key: key.to_string(),
            layer: "bronze".to_string(),
            state: state.to_string(),
            row_count: error.is_none().then_some(3),
            storage_location: None,
            error_kind: error.map(|_| "ExtractionError".to_string()),
            error: error.map(str::to_string),
            duration_ms: Some(12),
        }
    }

    #[tokio::test]
    async fn shared_store_is_used_from_the_blocking_pool() {
        let store = Arc::new(Mutex::new(Store::in_memory().unwrap()));
        with_store(&store, |s| s.insert_run("run-1", "2026-02-03T10:00:00Z")).await.unwrap();
        let runs = with_store(&store, |s| s.recent_runs(10)).await.unwrap();
        assert_eq!(runs[0].id, "run-1");

        let err = with_store(&store, |_| Err::<(), _>(rusqlite::Error::InvalidQuery))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Sqlite(_)));
    }

    #[test]
    fn create_and_complete_run() {
        let store = Store::in_memory().unwrap();

        store.insert_run("run-1", "2026-02-03T10:00:00Z").unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "running");

        store.complete_run("run-1", "succeeded", "2026-02-03T10:00:05Z", 5000).unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs[0].status, "succeeded");
        assert_eq!(runs[0].duration_ms, Some(5000));
    }

    #[test]
    fn insert_and_query_asset_runs() {
        let store = Store::in_memory().unwrap();
        store.insert_run("run-1", "2026-02-03T10:00:00Z").unwrap();

        store.insert_asset_run(&asset_run("run-1", "bronze/ecom/orders", "succeeded", None)).unwrap();
        store
            .insert_asset_run(&asset_run("run-1", "bronze/ecom/items", "failed", Some("no such table")))
            .unwrap();

        let assets = store.asset_runs_for("run-1").unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].asset_key, "bronze/ecom/orders");
        assert_eq!(assets[0].row_count, Some(3));
        assert_eq!(assets[1].error.as_deref(), Some("no such table"));
        assert_eq!(assets[1].error_kind.as_deref(), Some("ExtractionError"));
    }

    #[test]
    fn latest_materialization_is_replaced() {
        let store = Store::in_memory().unwrap();
        let key = AssetKey::layered(Layer::Silver, "ecom", "orders");

        let first = Materialization {
            key: key.clone(),
            storage_location: "memory://lake/silver/ecom/orders".to_string(),
            row_count: 3,
            columns: vec!["order_id".to_string(), "customer_id".to_string()],
            created_at: Utc::now(),
        };
        store.upsert_materialization(Some("run-1"), &first).unwrap();
        let second = Materialization { row_count: 5, ..first.clone() };
        store.upsert_materialization(Some("run-2"), &second).unwrap();

        let row = store.latest_materialization(&key.to_string()).unwrap().unwrap();
        assert_eq!(row.row_count, 5);
        assert_eq!(row.run_id.as_deref(), Some("run-2"));
        assert_eq!(row.columns, vec!["order_id", "customer_id"]);

        assert!(store.latest_materialization("gold/ecom/none").unwrap().is_none());
    }

    #[test]
    fn mark_inflight_as_crashed() {
        let store = Store::in_memory().unwrap();

        store.insert_run("run-1", "2026-02-03T10:00:00Z").unwrap();
        store.insert_run("run-2", "2026-02-03T10:00:01Z").unwrap();
        store.complete_run("run-2", "succeeded", "2026-02-03T10:00:05Z", 4000).unwrap();

        let crashed = store.mark_inflight_as_crashed().unwrap();
        assert_eq!(crashed, 1); // only run-1 was still running

        let runs = store.recent_runs(10).unwrap();
        let run1 = runs.iter().find(|r| r.id == "run-1").unwrap();
        assert_eq!(run1.status, "crashed");

        let run2 = runs.iter().find(|r| r.id == "run-2").unwrap();
        assert_eq!(run2.status, "succeeded");
    }

    #[test]
    fn recent_runs_respects_limit() {
        let store = Store::in_memory().unwrap();

        for i in 0..5 {
            store.insert_run(&format!("run-{i}"), &format!("2026-02-03T10:00:{i:02}Z")).unwrap();
        }

        let runs = store.recent_runs(3).unwrap();
        assert_eq!(runs.len(), 3);
        // Most recent first
        assert_eq!(runs[0].id, "run-4");
    }
}
