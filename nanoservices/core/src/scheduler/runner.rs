use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use medallion_utils::error::Error;
use medallion_utils::{ErrorKind, MedallionResult, Table};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::adapters::traits::Metadata;
use crate::asset::definition::{AdapterRef, AssetDefinition};
use crate::asset::key::AssetKey;
use crate::asset::materialization::Materialization;
use crate::dag::resolver::AssetGraph;
use crate::metadata::{MetadataRecorder, TracingRecorder};
use crate::scheduler::report::{AssetError, AssetOutcome, RunReport};
use crate::scheduler::state::{AssetState, RunState};
use crate::store::db::{with_store, AssetRunRow, Store};
use crate::transforms::traits::AssetInputs;

/// Result of a single asset execution, sent back to the scheduler loop.
struct AssetResult {
    idx: usize,
    result: MedallionResult<(Materialization, Table)>,
    duration_ms: u64,
}

/// Executes every asset of a graph once, in dependency order, with at most
/// `workers` assets in flight.
pub struct Scheduler {
    graph: Arc<AssetGraph>,
    workers: usize,
    recorder: Arc<dyn MetadataRecorder>,
    history: Option<Arc<Mutex<Store>>>,
}

impl Scheduler {
    pub fn new(graph: AssetGraph) -> Self {
        Self::shared(Arc::new(graph))
    }

    pub fn shared(graph: Arc<AssetGraph>) -> Self {
        Self {
            graph,
            workers: 4,
            recorder: Arc::new(TracingRecorder),
            history: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn MetadataRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Persist runs and asset outcomes into `store`.
    pub fn history(mut self, store: Arc<Mutex<Store>>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub async fn run(&self) -> RunReport {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run to completion, or until `shutdown` resolves. After shutdown no new
    /// asset starts: pending assets are skipped, running ones finish.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let graph = &self.graph;
        let run_id = Uuid::new_v4().to_string();
        let mut state = RunState::new(run_id.clone(), graph);
        let mut outcomes: Vec<Option<AssetOutcome>> = vec![None; graph.len()];

        if let Some(store) = &self.history {
            let (id, started_at) = (run_id.clone(), now());
            if let Err(e) = with_store(store, move |s| s.insert_run(&id, &started_at)).await {
                tracing::warn!(run = %run_id, error = %e, "failed to persist run start");
            }
        }
        tracing::info!(run = %run_id, assets = graph.len(), workers = self.workers, "run started");

        let (result_tx, mut result_rx) = mpsc::channel::<AssetResult>(graph.len().max(1));
        tokio::pin!(shutdown);
        let mut shutdown_seen = false;
        let mut recordings: Vec<(AssetKey, JoinHandle<()>)> = Vec::new();

        loop {
            while state.running() < self.workers {
                let Some(idx) = state.start_next() else { break };
                let def = graph.node(idx);
                if def.is_external() {
                    // Read by consumers through the extractor; nothing to store.
                    state.succeeded(graph, idx);
                    let outcome = outcome(def, AssetState::Succeeded, 0);
                    self.finish_asset(&run_id, idx, outcome, &mut outcomes).await;
                    continue;
                }
                tracing::debug!(run = %run_id, asset = %def.key(), "asset started");
                self.dispatch(idx, result_tx.clone());
            }

            if state.is_finished() {
                break;
            }

            tokio::select! {
                Some(done) = result_rx.recv() => {
                    let def = graph.node(done.idx);
                    match done.result {
                        Ok((m, stored)) => {
                            state.succeeded(graph, done.idx);
                            crate::metrics::inc_materialization(def.layer().as_str());
                            let mut o = outcome(def, AssetState::Succeeded, done.duration_ms);
                            o.row_count = Some(m.row_count);
                            o.location = Some(m.storage_location.clone());
                            self.finish_asset(&run_id, done.idx, o, &mut outcomes).await;
                            recordings.push((def.key().clone(), self.record(&run_id, def.key(), m, stored)));
                        }
                        Err(e) => {
                            let kind = e.kind();
                            tracing::error!(
                                run = %run_id,
                                asset = %def.key(),
                                kind = %kind,
                                error = %e,
                                "asset failed"
                            );
                            crate::metrics::inc_failure(def.layer().as_str(), kind.as_str());
                            let mut o = outcome(def, AssetState::Failed, done.duration_ms);
                            o.error = Some(AssetError { kind, message: e.to_string() });
                            self.finish_asset(&run_id, done.idx, o, &mut outcomes).await;

                            for skipped in state.failed(graph, done.idx) {
                                self.skip(&run_id, skipped, &mut outcomes).await;
                            }
                        }
                    }
                }
                _ = &mut shutdown, if !shutdown_seen => {
                    shutdown_seen = true;
                    let skipped = state.cancel();
                    tracing::info!(run = %run_id, skipped = skipped.len(), "run cancelled");
                    for idx in skipped {
                        self.skip(&run_id, idx, &mut outcomes).await;
                    }
                }
                else => break,
            }
        }

        for (key, handle) in recordings {
            if let Err(e) = handle.await {
                tracing::warn!(run = %run_id, asset = %key, error = %e, "metadata recorder aborted");
            }
        }

        let duration_ms = state.started_at.elapsed().as_millis() as u64;
        let status = state.status();
        if let Some(store) = &self.history {
            let (id, finished_at) = (run_id.clone(), now());
            let completed = with_store(store, move |s| {
                s.complete_run(&id, status.as_str(), &finished_at, duration_ms as i64)
            })
            .await;
            if let Err(e) = completed {
                tracing::warn!(run = %run_id, error = %e, "failed to persist run completion");
            }
        }
        crate::metrics::inc_run(status.as_str());
        tracing::info!(
            run = %run_id,
            status = status.as_str(),
            duration_ms,
            succeeded = state_count(&outcomes, AssetState::Succeeded),
            failed = state_count(&outcomes, AssetState::Failed),
            skipped = state_count(&outcomes, AssetState::Skipped),
            "run finished"
        );

        let mut ordered: Vec<usize> = (0..graph.len()).collect();
        ordered.sort_by_key(|&i| graph.rank(i));
        let assets = ordered.into_iter().filter_map(|i| outcomes[i].take()).collect();

        RunReport { run_id, status, duration_ms, assets }
    }

    /// Spawn one asset execution. The result is reported only after the
    /// asset's output has been stored.
    fn dispatch(&self, idx: usize, result_tx: mpsc::Sender<AssetResult>) {
        let graph = self.graph.clone();
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let handle = tokio::spawn(execute(graph, idx));
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::transformation(format!("asset task aborted: {e}"))),
            };
            let duration_ms = start.elapsed().as_millis() as u64;
            let _ = result_tx.send(AssetResult { idx, result, duration_ms }).await;
        });
    }

    /// Hand a settled materialization to the recorder on its own task, so a
    /// failing or panicking recorder cannot touch the asset outcome.
    fn record(&self, run_id: &str, key: &AssetKey, m: Materialization, stored: Table) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        let (run_id, key) = (run_id.to_string(), key.clone());
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&run_id, &key, &m, &stored).await {
                tracing::warn!(run = %run_id, asset = %key, error = %e, "metadata recorder failed");
            }
        })
    }

    async fn skip(&self, run_id: &str, idx: usize, outcomes: &mut [Option<AssetOutcome>]) {
        let def = self.graph.node(idx);
        tracing::warn!(run = %run_id, asset = %def.key(), "asset skipped");
        crate::metrics::inc_skipped(def.layer().as_str());
        self.finish_asset(run_id, idx, outcome(def, AssetState::Skipped, 0), outcomes).await;
    }

    async fn finish_asset(
        &self,
        run_id: &str,
        idx: usize,
        outcome: AssetOutcome,
        outcomes: &mut [Option<AssetOutcome>],
    ) {
        crate::metrics::observe_duration(&outcome.key.to_string(), outcome.duration_ms as f64);
        if let Some(store) = &self.history {
            let row = AssetRunRow {
                run_id: run_id.to_string(),
                asset_key: outcome.key.to_string(),
                layer: outcome.layer.as_str().to_string(),
                state: outcome.state.as_str().to_string(),
                row_count: outcome.row_count.map(|n| n as i64),
                storage_location: outcome.location.clone(),
                error_kind: outcome.error.as_ref().map(|e| e.kind.as_str().to_string()),
                error: outcome.error.as_ref().map(|e| e.message.clone()),
                duration_ms: Some(outcome.duration_ms as i64),
            };
            if let Err(e) = with_store(store, move |s| s.insert_asset_run(&row)).await {
                tracing::warn!(run = %run_id, asset = %outcome.key, error = %e, "failed to persist asset outcome");
            }
        }
        outcomes[idx] = Some(outcome);
    }
}

/// Load inputs, transform, store.
async fn execute(graph: Arc<AssetGraph>, idx: usize) -> MedallionResult<(Materialization, Table)> {
    let def = graph.node(idx);
    let key = def.key();

    let mut inputs = HashMap::with_capacity(graph.upstream_indices(idx).len());
    for &u in graph.upstream_indices(idx) {
        let upstream = graph.node(u);
        inputs.insert(upstream.key().clone(), load_input(upstream).await?);
    }

    let output = def
        .transform()
        .transform(AssetInputs::new(inputs))
        .await
        .map_err(|e| e.within(ErrorKind::TransformationError, &key.to_string()))?;

    persist(def, output).await
}

/// Fresh copy of an upstream's current data through its own adapter.
async fn load_input(upstream: &AssetDefinition) -> MedallionResult<Table> {
    let key = upstream.key();
    match upstream.adapter() {
        AdapterRef::Source { extractor, query } => extractor
            .extract(query)
            .await
            .map_err(|e| e.within(ErrorKind::ExtractionError, &key.to_string())),
        AdapterRef::Object(materializer) => materializer
            .load(key)
            .await
            .map_err(|e| e.within(ErrorKind::MaterializationError, &materializer.location(key))),
        AdapterRef::Warehouse { target, .. } => Err(Error::load(
            target.qualified_name(),
            "warehouse tables are write-only and cannot be read as inputs",
        )),
    }
}

async fn persist(def: &AssetDefinition, output: Table) -> MedallionResult<(Materialization, Table)> {
    let key = def.key();
    match def.adapter() {
        AdapterRef::Object(materializer) => {
            let mut metadata = Metadata::new();
            metadata.insert("asset".to_string(), serde_json::json!(key.to_string()));
            metadata.insert("records".to_string(), serde_json::json!(output.num_rows()));
            metadata.insert("columns".to_string(), serde_json::json!(output.column_names()));
            let m = materializer
                .store(key, &output, &metadata)
                .await
                .map_err(|e| e.within(ErrorKind::MaterializationError, &materializer.location(key)))?;
            Ok((m, output))
        }
        AdapterRef::Warehouse { loader, target } => {
            let conformed = target.conform(&output)?;
            let loaded = loader
                .load_table(&target.schema, &target.table, &conformed)
                .await
                .map_err(|e| e.within(ErrorKind::LoadError, &target.qualified_name()))?;
            let m = Materialization::new(key.clone(), loaded.target, &conformed);
            Ok((m, conformed))
        }
        AdapterRef::Source { .. } => Err(Error::transformation(format!(
            "source asset {key} is external and cannot be materialized"
        ))),
    }
}

fn outcome(def: &AssetDefinition, state: AssetState, duration_ms: u64) -> AssetOutcome {
    AssetOutcome {
        key: def.key().clone(),
        layer: def.layer(),
        state,
        row_count: None,
        location: None,
        error: None,
        duration_ms,
    }
}

fn state_count(outcomes: &[Option<AssetOutcome>], state: AssetState) -> usize {
    outcomes.iter().flatten().filter(|o| o.state == state).count()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
