//! Backward pass driver.

use crate::autograd::{Adjoints, generate_adjoints};
use crate::error::Result;
use crate::graph::{Graph, NodeId, graph_to_string, reverse_topological_order};

/// Differentiates `root` with respect to every node it depends on.
///
/// `seed` is the gradient of `root`. Nodes are visited in reverse
/// topological order so each rule runs after all of its consumers have
/// contributed. Set `BNORM_IR_DUMP=1` to log the graph before and after the
/// pass at debug level.
pub fn backprop(graph: &Graph, root: NodeId, seed: NodeId) -> Result<Adjoints> {
    let dump = std::env::var("BNORM_IR_DUMP")
        .map(|v| v == "1")
        .unwrap_or(false);

    let mut adjoints = Adjoints::new();
    adjoints.add_delta(graph, root, seed)?;

    if dump {
        log::debug!("forward graph:\n{}", graph_to_string(graph, &[root])?);
    }

    for node in reverse_topological_order(graph, &[root])? {
        let Some(delta) = adjoints.get(node) else {
            continue;
        };
        generate_adjoints(graph, &mut adjoints, node, delta)?;
    }

    if dump {
        let mut gradients: Vec<NodeId> = adjoints.iter().map(|(_, delta)| delta).collect();
        gradients.sort();
        log::debug!("backward graph:\n{}", graph_to_string(graph, &gradients)?);
    }
    log::debug!("backprop from {root}: {} adjoint(s)", adjoints.len());
    Ok(adjoints)
}
