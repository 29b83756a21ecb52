//! Adjoint accumulator for one differentiation pass.

use rustc_hash::FxHashMap;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId};

/// Accumulated gradient node of every node reached during a pass.
///
/// Contributions are additive: a second contribution for the same node is
/// summed with the first through an `Add` node, never overwriting it.
#[derive(Debug, Clone, Default)]
pub struct Adjoints {
    deltas: FxHashMap<NodeId, NodeId>,
}

impl Adjoints {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Adjoints {
            deltas: FxHashMap::default(),
        }
    }

    /// Returns the accumulated gradient of `node`.
    pub fn get(&self, node: NodeId) -> Option<NodeId> {
        self.deltas.get(&node).copied()
    }

    /// Adds `delta` to the gradient of `node` and returns the new
    /// accumulated gradient node.
    ///
    /// `delta` must have the element type and shape of the first output of
    /// `node`; a rejected contribution leaves the accumulator untouched.
    pub fn add_delta(&mut self, graph: &Graph, node: NodeId, delta: NodeId) -> Result<NodeId> {
        self.check_delta(graph, node, delta)?;
        self.accumulate(graph, node, delta)
    }

    /// Adds several contributions at once. Every pair is checked before any
    /// of them is recorded, so on error neither the accumulator nor the graph
    /// has changed.
    pub fn add_deltas(&mut self, graph: &Graph, contributions: &[(NodeId, NodeId)]) -> Result<()> {
        for &(node, delta) in contributions {
            self.check_delta(graph, node, delta)?;
        }
        for &(node, delta) in contributions {
            self.accumulate(graph, node, delta)?;
        }
        Ok(())
    }

    fn check_delta(&self, graph: &Graph, node: NodeId, delta: NodeId) -> Result<()> {
        for id in [node, delta] {
            if !graph.contains(id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        let outputs = graph.node(node)?.outputs;
        let expected = outputs.first().cloned().ok_or(GraphError::OutputIndex {
            node,
            index: 0,
            count: 0,
        })?;
        let actual = graph.value_of("Adjoints", "delta", delta)?;
        if actual != expected {
            return Err(GraphError::AdjointMismatch {
                node,
                delta,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn accumulate(&mut self, graph: &Graph, node: NodeId, delta: NodeId) -> Result<NodeId> {
        let accumulated = match self.deltas.get(&node) {
            Some(&existing) => {
                let sum = graph.add(existing, delta)?;
                log::debug!("adjoint of {node}: {existing} + {delta} -> {sum}");
                sum
            }
            None => {
                log::debug!("adjoint of {node}: {delta}");
                delta
            }
        };
        self.deltas.insert(node, accumulated);
        Ok(accumulated)
    }

    /// Returns the number of nodes holding a gradient.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Returns an iterator over (node, gradient) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.deltas.iter().map(|(&node, &delta)| (node, delta))
    }
}
