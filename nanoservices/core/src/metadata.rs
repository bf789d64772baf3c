//! Observers of successful materializations.

use std::sync::Arc;

use async_trait::async_trait;
use medallion_utils::Table;
use tokio::sync::Mutex;
use tracing::info;

use crate::asset::key::AssetKey;
use crate::asset::materialization::Materialization;
use crate::store::db::{with_store, HistoryError, Store};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("history store error: {0}")]
    Store(#[from] HistoryError),
    #[error("{0}")]
    Other(String),
}

/// Called once per successful materialization of run `run_id`, after the
/// asset's outcome is settled. Errors and panics are logged by the scheduler
/// and never change the asset outcome.
#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn record(
        &self,
        run_id: &str,
        key: &AssetKey,
        materialization: &Materialization,
        table: &Table,
    ) -> Result<(), RecordError>;
}

/// Emits one structured event per materialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

#[async_trait]
impl MetadataRecorder for TracingRecorder {
    async fn record(&self, run_id: &str, key: &AssetKey, m: &Materialization, _table: &Table) -> Result<(), RecordError> {
        info!(
            run = %run_id,
            asset = %key,
            records = m.row_count,
            columns = ?m.columns,
            location = %m.storage_location,
            "materialized"
        );
        Ok(())
    }
}

/// Keeps the latest materialization of each asset in the history store,
/// linked to the run that produced it.
pub struct HistoryRecorder {
    store: Arc<Mutex<Store>>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataRecorder for HistoryRecorder {
    async fn record(&self, run_id: &str, _key: &AssetKey, m: &Materialization, _table: &Table) -> Result<(), RecordError> {
        let run_id = run_id.to_string();
        let m = m.clone();
        with_store(&self.store, move |store| store.upsert_materialization(Some(&run_id), &m)).await?;
        Ok(())
    }
}

/// Forwards to every inner recorder. All are called; the first error wins.
#[derive(Default)]
pub struct FanoutRecorder {
    recorders: Vec<Arc<dyn MetadataRecorder>>,
}

impl FanoutRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, recorder: Arc<dyn MetadataRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }
}

#[async_trait]
impl MetadataRecorder for FanoutRecorder {
    async fn record(&self, run_id: &str, key: &AssetKey, m: &Materialization, table: &Table) -> Result<(), RecordError> {
        let mut first_error = None;
        for recorder in &self.recorders {
            if let Err(e) = recorder.record(run_id, key, m, table).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::key::Layer;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl MetadataRecorder for Failing {
        async fn record(&self, _: &str, _: &AssetKey, _: &Materialization, _: &Table) -> Result<(), RecordError> {
            Err(RecordError::Other("catalog unavailable".to_string()))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl MetadataRecorder for Counting {
        async fn record(&self, _: &str, _: &AssetKey, _: &Materialization, _: &Table) -> Result<(), RecordError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn materialized() -> (AssetKey, Materialization, Table) {
        let key = AssetKey::layered(Layer::Gold, "ecom", "summary");
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let table = Table::from_batch(
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap(),
        );
        let m = Materialization::new(key.clone(), "memory://lake/gold/ecom/summary", &table);
        (key, m, table)
    }

    #[tokio::test]
    async fn history_recorder_upserts_latest() {
        let store = Arc::new(Mutex::new(Store::in_memory().unwrap()));
        let recorder = HistoryRecorder::new(store.clone());
        let (key, m, table) = materialized();

        recorder.record("run-1", &key, &m, &table).await.unwrap();

        let row = store.lock().await.latest_materialization(&key.to_string()).unwrap().unwrap();
        assert_eq!(row.row_count, 2);
        assert_eq!(row.run_id.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn fanout_calls_every_recorder_despite_errors() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let fanout = FanoutRecorder::new()
            .with(Arc::new(Failing))
            .with(counting.clone())
            .with(Arc::new(TracingRecorder));
        let (key, m, table) = materialized();

        let result = fanout.record("run-1", &key, &m, &table).await;
        assert!(result.is_err());
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
