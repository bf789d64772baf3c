use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::adapters::object::FileObjectStore;
use crate::adapters::source::SqliteExtractor;
use crate::adapters::traits::{ObjectMaterializer, SourceExtractor, WarehouseLoader};
use crate::adapters::warehouse::SqliteWarehouse;
use crate::config::loader::{load_config, parse_duration, validate, ConfigError};
use crate::config::types::EngineConfig;
use crate::dag::registry::AssetRegistry;
use crate::dag::resolver::DagError;
use crate::metadata::{FanoutRecorder, HistoryRecorder, TracingRecorder};
use crate::scheduler::report::RunReport;
use crate::scheduler::runner::Scheduler;
use crate::store::db::Store;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("asset graph error: {0}")]
    Dag(#[from] DagError),
    #[error("history store error: {0}")]
    History(#[from] rusqlite::Error),
}

/// The storage backends assets bind to, shared by every asset of a catalog.
#[derive(Clone)]
pub struct Adapters {
    pub source: Arc<dyn SourceExtractor>,
    pub objects: Arc<dyn ObjectMaterializer>,
    pub warehouse: Arc<dyn WarehouseLoader>,
}

/// Top-level orchestrator: builds the adapters from an [`EngineConfig`] and
/// runs registries of assets against them.
pub struct Engine {
    workers: usize,
    adapters: Adapters,
    warehouse: Arc<SqliteWarehouse>,
    history: Arc<Mutex<Store>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        validate(&config)?;

        let mut extractor = SqliteExtractor::open(
            &config.source.path,
            config.source.pool_size,
            parse_duration(&config.source.busy_timeout)?,
        );
        if let Some(timeout) = &config.source.query_timeout {
            extractor = extractor.with_query_timeout(parse_duration(timeout)?);
        }
        let objects = FileObjectStore::new(&config.object_store.root, &config.object_store.bucket);
        let warehouse = Arc::new(SqliteWarehouse::open(
            &config.warehouse.path,
            config.warehouse.pool_size,
            parse_duration(&config.warehouse.busy_timeout)?,
        ));

        let store = match &config.history.path {
            Some(path) => Store::open(path)?,
            None => Store::in_memory()?,
        };
        let crashed = store.mark_inflight_as_crashed()?;
        if crashed > 0 {
            tracing::warn!(count = crashed, "marked in-flight runs as crashed from previous session");
        }

        Ok(Self {
            workers: config.workers,
            adapters: Adapters {
                source: Arc::new(extractor),
                objects: Arc::new(objects),
                warehouse: warehouse.clone(),
            },
            warehouse,
            history: Arc::new(Mutex::new(store)),
        })
    }

    /// Load the YAML config at `path` and build an engine from it.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::new(load_config(path)?)
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// The warehouse, for reading loaded tables back.
    pub fn warehouse(&self) -> &Arc<SqliteWarehouse> {
        &self.warehouse
    }

    pub fn history(&self) -> Arc<Mutex<Store>> {
        self.history.clone()
    }

    /// Run every asset of `registry` once, cancelling on Ctrl-C.
    pub async fn run(&self, registry: &AssetRegistry) -> Result<RunReport, EngineError> {
        let shutdown = tokio::signal::ctrl_c();
        self.run_with_shutdown(registry, async {
            let _ = shutdown.await;
        })
        .await
    }

    /// Run every asset of `registry` once. When `shutdown` resolves, running
    /// assets finish and pending ones are skipped.
    pub async fn run_with_shutdown<F>(&self, registry: &AssetRegistry, shutdown: F) -> Result<RunReport, EngineError>
    where
        F: Future<Output = ()>,
    {
        let graph = registry.build_graph()?;
        let recorder = FanoutRecorder::new()
            .with(Arc::new(TracingRecorder))
            .with(Arc::new(HistoryRecorder::new(self.history.clone())));

        let report = Scheduler::new(graph)
            .workers(self.workers)
            .recorder(Arc::new(recorder))
            .history(self.history.clone())
            .run_with_shutdown(shutdown)
            .await;
        Ok(report)
    }
}
