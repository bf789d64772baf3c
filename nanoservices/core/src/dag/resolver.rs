use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use crate::asset::definition::{AdapterKind, AssetDefinition};
use crate::asset::key::{AssetKey, Layer};

/// Errors that can occur while registering assets or resolving the graph.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("Asset already registered: {0}")]
    DuplicateKey(AssetKey),

    #[error("Asset {asset} depends on unregistered asset {upstream}")]
    UnknownUpstream { asset: AssetKey, upstream: AssetKey },

    #[error("Asset {asset} ({layer}) cannot depend on {upstream} ({upstream_layer})")]
    LayerViolation {
        asset: AssetKey,
        layer: Layer,
        upstream: AssetKey,
        upstream_layer: Layer,
    },

    #[error("Asset {asset} depends on write-only warehouse asset {upstream}")]
    WriteOnlyUpstream { asset: AssetKey, upstream: AssetKey },

    #[error("Cycle detected in asset graph: {}", render_cycle(.0))]
    CycleDetected(Vec<AssetKey>),
}

fn render_cycle(members: &[AssetKey]) -> String {
    let mut rendered: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = rendered.first().cloned() {
        rendered.push(first);
    }
    rendered.join(" -> ")
}

/// Check a single upstream edge against the layer and adapter rules.
pub(crate) fn check_edge(asset: &AssetDefinition, upstream: &AssetDefinition) -> Result<(), DagError> {
    if upstream.layer() > asset.layer() {
        return Err(DagError::LayerViolation {
            asset: asset.key().clone(),
            layer: asset.layer(),
            upstream: upstream.key().clone(),
            upstream_layer: upstream.layer(),
        });
    }
    if upstream.adapter().kind() == AdapterKind::Warehouse {
        return Err(DagError::WriteOnlyUpstream {
            asset: asset.key().clone(),
            upstream: upstream.key().clone(),
        });
    }
    Ok(())
}

/// A resolved, acyclic asset graph. Immutable snapshot of a registry.
#[derive(Debug)]
pub struct AssetGraph {
    /// Definitions in declaration order.
    nodes: Vec<Arc<AssetDefinition>>,
    index: HashMap<AssetKey, usize>,
    upstream: Vec<Vec<usize>>,
    downstream: Vec<Vec<usize>>,
    /// Position of each node in the topological order.
    rank: Vec<usize>,
    generation: u64,
}

/// Resolve declared assets into an execution graph. Every upstream key must
/// be among `nodes`.
pub fn resolve(nodes: Vec<Arc<AssetDefinition>>, generation: u64) -> Result<AssetGraph, DagError> {
    let mut index: HashMap<AssetKey, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.key().clone(), i).is_some() {
            return Err(DagError::DuplicateKey(node.key().clone()));
        }
    }

    let mut upstream = vec![Vec::new(); nodes.len()];
    let mut downstream = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for up_key in node.upstream() {
            let &j = index.get(up_key).ok_or_else(|| DagError::UnknownUpstream {
                asset: node.key().clone(),
                upstream: up_key.clone(),
            })?;
            check_edge(node, &nodes[j])?;
            upstream[i].push(j);
            downstream[j].push(i);
        }
    }

    let mut graph = AssetGraph {
        nodes,
        index,
        upstream,
        downstream,
        rank: Vec::new(),
        generation,
    };

    let order: Vec<usize> = graph.order_indices().collect();
    if order.len() != graph.nodes.len() {
        return Err(DagError::CycleDetected(graph.find_cycle(&order)));
    }

    let mut rank = vec![0; graph.nodes.len()];
    for (position, &i) in order.iter().enumerate() {
        rank[i] = position;
    }
    graph.rank = rank;
    Ok(graph)
}

impl AssetGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registry generation this graph was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<AssetDefinition>> {
        self.nodes.iter()
    }

    /// Direct upstream keys of `key`.
    pub fn upstream_of(&self, key: &AssetKey) -> Vec<&AssetKey> {
        self.index
            .get(key)
            .map(|&i| self.upstream[i].iter().map(|&j| self.nodes[j].key()).collect())
            .unwrap_or_default()
    }

    /// Transitive downstream closure of `key`, excluding `key` itself.
    pub fn downstream_of(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        let Some(&start) = self.index.get(key) else {
            return BTreeSet::new();
        };
        self.descendants(start)
            .into_iter()
            .map(|i| self.nodes[i].key().clone())
            .collect()
    }

    /// Lazy topological order. Ties go to the lower layer, then to the
    /// earlier declaration.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        TopologicalOrder {
            graph: self,
            inner: self.order_indices(),
        }
    }

    pub(crate) fn node(&self, i: usize) -> &Arc<AssetDefinition> {
        &self.nodes[i]
    }

    pub(crate) fn upstream_indices(&self, i: usize) -> &[usize] {
        &self.upstream[i]
    }

    pub(crate) fn downstream_indices(&self, i: usize) -> &[usize] {
        &self.downstream[i]
    }

    pub(crate) fn rank(&self, i: usize) -> usize {
        self.rank[i]
    }

    pub(crate) fn descendants(&self, start: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue: VecDeque<usize> = self.downstream[start].iter().copied().collect();
        let mut out = Vec::new();
        while let Some(i) = queue.pop_front() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            out.push(i);
            queue.extend(self.downstream[i].iter().copied());
        }
        out
    }

    fn order_indices(&self) -> OrderIndices<'_> {
        let in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let ready = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse((self.nodes[i].layer(), i)))
            .collect();
        OrderIndices {
            graph: self,
            in_degree,
            ready,
        }
    }

    /// Members of one cycle among the nodes Kahn's algorithm could not
    /// order, in dependency order, starting at the earliest declared member.
    fn find_cycle(&self, ordered: &[usize]) -> Vec<AssetKey> {
        let mut blocked = vec![true; self.nodes.len()];
        for &i in ordered {
            blocked[i] = false;
        }

        // Every blocked node has a blocked upstream, so walking upstream
        // edges through blocked nodes must revisit one.
        let Some(start) = blocked.iter().position(|&b| b) else {
            return Vec::new();
        };
        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        while let std::collections::hash_map::Entry::Vacant(slot) = position.entry(current) {
            slot.insert(path.len());
            path.push(current);
            match self.upstream[current].iter().copied().filter(|&j| blocked[j]).min() {
                Some(next) => current = next,
                None => return Vec::new(),
            }
        }

        let mut cycle: Vec<usize> = path[position[&current]..].to_vec();
        // The walk went against the edges.
        cycle.reverse();
        if let Some(min_pos) = cycle.iter().enumerate().min_by_key(|(_, &i)| i).map(|(p, _)| p) {
            cycle.rotate_left(min_pos);
        }
        cycle.into_iter().map(|i| self.nodes[i].key().clone()).collect()
    }
}

/// Kahn's algorithm, one node per `next`.
struct OrderIndices<'a> {
    graph: &'a AssetGraph,
    in_degree: Vec<usize>,
    ready: BinaryHeap<Reverse<(Layer, usize)>>,
}

impl Iterator for OrderIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let Reverse((_, i)) = self.ready.pop()?;
        for &d in &self.graph.downstream[i] {
            self.in_degree[d] -= 1;
            if self.in_degree[d] == 0 {
                self.ready.push(Reverse((self.graph.nodes[d].layer(), d)));
            }
        }
        Some(i)
    }
}

/// Lazily computed topological order over a graph snapshot. Finite; after
/// the registry changes a fresh graph and order must be built.
pub struct TopologicalOrder<'a> {
    graph: &'a AssetGraph,
    inner: OrderIndices<'a>,
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = &'a AssetKey;

    fn next(&mut self) -> Option<&'a AssetKey> {
        let graph = self.graph;
        self.inner.next().map(|i| graph.nodes[i].key())
    }
}
