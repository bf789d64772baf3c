use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use serde::Serialize;

use crate::dag::resolver::AssetGraph;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Status of an individual asset within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl AssetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetState::Succeeded | AssetState::Failed | AssetState::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Pending => "pending",
            AssetState::Running => "running",
            AssetState::Succeeded => "succeeded",
            AssetState::Failed => "failed",
            AssetState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory state for a single run over a graph. Assets are addressed by
/// their graph index.
#[derive(Debug)]
pub struct RunState {
    pub id: String,
    states: Vec<AssetState>,
    /// Upstreams of each asset that have not succeeded yet.
    waiting_on: Vec<usize>,
    /// Dispatchable assets, lowest topological rank first.
    ready: BinaryHeap<Reverse<(usize, usize)>>,
    cancelled: bool,
    pub started_at: std::time::Instant,
}

impl RunState {
    pub fn new(id: String, graph: &AssetGraph) -> Self {
        let waiting_on: Vec<usize> = (0..graph.len()).map(|i| graph.upstream_indices(i).len()).collect();
        let ready = waiting_on
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0)
            .map(|(i, _)| Reverse((graph.rank(i), i)))
            .collect();
        Self {
            id,
            states: vec![AssetState::Pending; graph.len()],
            waiting_on,
            ready,
            cancelled: false,
            started_at: std::time::Instant::now(),
        }
    }

    pub fn state(&self, idx: usize) -> AssetState {
        self.states[idx]
    }

    pub fn running(&self) -> usize {
        self.states.iter().filter(|s| **s == AssetState::Running).count()
    }

    /// Take the next ready asset and mark it Running.
    pub fn start_next(&mut self) -> Option<usize> {
        while let Some(Reverse((_, idx))) = self.ready.pop() {
            if self.states[idx] == AssetState::Pending {
                self.states[idx] = AssetState::Running;
                return Some(idx);
            }
        }
        None
    }

    /// Record that an asset succeeded. Direct downstreams whose upstreams
    /// have all succeeded become ready.
    pub fn succeeded(&mut self, graph: &AssetGraph, idx: usize) {
        self.states[idx] = AssetState::Succeeded;
        for &d in graph.downstream_indices(idx) {
            self.waiting_on[d] -= 1;
            if self.waiting_on[d] == 0 && self.states[d] == AssetState::Pending && !self.cancelled {
                self.ready.push(Reverse((graph.rank(d), d)));
            }
        }
    }

    /// Mark an asset as failed and skip every transitive descendant.
    /// Returns the newly skipped assets.
    pub fn failed(&mut self, graph: &AssetGraph, idx: usize) -> Vec<usize> {
        self.states[idx] = AssetState::Failed;
        let mut skipped: Vec<usize> = graph
            .descendants(idx)
            .into_iter()
            .filter(|&d| self.states[d] == AssetState::Pending)
            .collect();
        skipped.sort_by_key(|&d| graph.rank(d));
        for &d in &skipped {
            self.states[d] = AssetState::Skipped;
        }
        skipped
    }

    /// Skip every asset that has not started. Running assets are left to
    /// finish. Returns the newly skipped assets.
    pub fn cancel(&mut self) -> Vec<usize> {
        self.cancelled = true;
        self.ready.clear();
        let mut skipped = Vec::new();
        for (idx, state) in self.states.iter_mut().enumerate() {
            if *state == AssetState::Pending {
                *state = AssetState::Skipped;
                skipped.push(idx);
            }
        }
        skipped
    }

    pub fn is_finished(&self) -> bool {
        self.states.iter().all(AssetState::is_terminal)
    }

    pub fn status(&self) -> RunStatus {
        if !self.is_finished() {
            RunStatus::Running
        } else if self.states.contains(&AssetState::Failed) {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        }
    }
}
