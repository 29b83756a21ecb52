//! Graph traversal utilities

use rustc_hash::FxHashSet;

use super::{Graph, NodeId};
use crate::error::{GraphError, Result};

/// Topological order (inputs before outputs) of the nodes reachable from
/// `roots`. Fails if a root does not belong to `graph`.
pub fn topological_order(graph: &Graph, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    if let Some(&unknown) = roots.iter().find(|&&root| !graph.contains(root)) {
        return Err(GraphError::UnknownNode(unknown));
    }

    fn visit(graph: &Graph, id: NodeId, visited: &mut FxHashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        for input in graph.get_view(id).inputs() {
            visit(graph, input.node, visited, order);
        }
        order.push(id);
    }

    let mut visited = FxHashSet::default();
    let mut order = Vec::new();
    for &root in roots {
        visit(graph, root, &mut visited, &mut order);
    }
    Ok(order)
}

/// Reverse topological order: every node appears after all of its consumers
/// that are reachable from `roots`.
pub fn reverse_topological_order(graph: &Graph, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut order = topological_order(graph, roots)?;
    order.reverse();
    Ok(order)
}

/// Convert graph to string representation (for debugging)
pub fn graph_to_string(graph: &Graph, roots: &[NodeId]) -> Result<String> {
    let mut result = String::new();
    for id in topological_order(graph, roots)? {
        let view = graph.get_view(id);
        let inputs: Vec<String> = view
            .inputs()
            .iter()
            .map(|input| format!("{}.{}", input.node, input.index))
            .collect();
        let outputs: Vec<String> = view
            .outputs()
            .iter()
            .map(|output| output.to_string())
            .collect();
        result.push_str(&format!(
            "{} = {:?}({}) -> ({})\n",
            id,
            view.op(),
            inputs.join(", "),
            outputs.join(", ")
        ));
    }
    Ok(result)
}
