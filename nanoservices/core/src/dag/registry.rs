use std::collections::HashMap;
use std::sync::Arc;

use crate::asset::definition::AssetDefinition;
use crate::asset::key::AssetKey;
use crate::dag::resolver::{self, check_edge, AssetGraph, DagError};

/// Static declaration of every asset, in declaration order.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    defs: Vec<Arc<AssetDefinition>>,
    index: HashMap<AssetKey, usize>,
    generation: u64,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset whose upstream assets are already registered.
    pub fn register(&mut self, def: AssetDefinition) -> Result<(), DagError> {
        if self.index.contains_key(def.key()) {
            return Err(DagError::DuplicateKey(def.key().clone()));
        }
        for up in def.upstream() {
            let upstream = self.get(up).ok_or_else(|| DagError::UnknownUpstream {
                asset: def.key().clone(),
                upstream: up.clone(),
            })?;
            check_edge(&def, upstream)?;
        }
        self.push(def);
        Ok(())
    }

    /// Declare an asset in any order. References are validated by
    /// [`AssetRegistry::build_graph`].
    pub fn declare(&mut self, def: AssetDefinition) -> Result<(), DagError> {
        if self.index.contains_key(def.key()) {
            return Err(DagError::DuplicateKey(def.key().clone()));
        }
        self.push(def);
        Ok(())
    }

    pub fn get(&self, key: &AssetKey) -> Option<&AssetDefinition> {
        self.index.get(key).map(|&i| self.defs[i].as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.defs.iter().map(|d| d.key())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Resolve the full graph: unknown upstreams, layer rules and cycles.
    pub fn build_graph(&self) -> Result<AssetGraph, DagError> {
        resolver::resolve(self.defs.clone(), self.generation)
    }

    /// True when the registry changed after `graph` was built, so its
    /// topological order no longer describes the registry.
    pub fn is_stale(&self, graph: &AssetGraph) -> bool {
        graph.generation() != self.generation
    }

    fn push(&mut self, def: AssetDefinition) {
        self.index.insert(def.key().clone(), self.defs.len());
        self.defs.push(Arc::new(def));
        self.generation += 1;
    }
}
