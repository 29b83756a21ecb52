//! Adjoint rules, one per op.

use crate::autograd::Adjoints;
use crate::error::{GraphError, Result};
use crate::graph::ops::batch_norm::{
    OUTPUT_D_BETA, OUTPUT_D_GAMMA, OUTPUT_D_INPUT, OUTPUT_MEAN, OUTPUT_RESULT, OUTPUT_VARIANCE,
};
use crate::graph::{Graph, GraphOp, NodeId};

/// Applies the adjoint rule of `node` given `delta`, the gradient flowing
/// into its primary output.
///
/// Must run at most once per node and pass, after every consumer of `node`
/// has contributed its gradient.
pub fn generate_adjoints(
    graph: &Graph,
    adjoints: &mut Adjoints,
    node: NodeId,
    delta: NodeId,
) -> Result<()> {
    let data = graph.node(node)?;
    log::debug!("{node}: {} adjoint rule, delta {delta}", data.op.name());
    match data.op {
        GraphOp::Parameter => Ok(()),
        GraphOp::Add => {
            let contributions: Vec<_> = data.inputs.iter().map(|i| (i.node, delta)).collect();
            adjoints.add_deltas(graph, &contributions)
        }
        GraphOp::GetOutputElement { n } => {
            let source = data.inputs[0].node;
            if n == OUTPUT_RESULT {
                adjoints.add_delta(graph, source, delta)?;
                return Ok(());
            }
            // only the BatchNorm statistics are treated as constants
            match graph.node(source)?.op {
                GraphOp::BatchNorm { .. } => {
                    log::debug!("{node}: gradient on output {n} of {source} is not propagated");
                    Ok(())
                }
                op => Err(GraphError::NotDifferentiable { op: op.name() }),
            }
        }
        GraphOp::BatchNorm { epsilon } => {
            batch_norm_adjoints(graph, adjoints, node, epsilon, delta)
        }
        GraphOp::BatchNormBackprop { .. } => Err(GraphError::NotDifferentiable {
            op: data.op.name(),
        }),
    }
}

/// Appends a `BatchNormBackprop` node for `node` and records gradients for
/// its input, gamma and beta.
///
/// The backward op needs the mean and variance the forward op produced. The
/// extractors bound to those outputs are found among the consumers of `node`
/// and slotted by output index; the lowest id wins when several bind the
/// same output.
fn batch_norm_adjoints(
    graph: &Graph,
    adjoints: &mut Adjoints,
    node: NodeId,
    epsilon: f64,
    delta: NodeId,
) -> Result<()> {
    let view = graph.get_view(node);
    let inputs = view.inputs();
    let (gamma, beta, input) = (inputs[0].node, inputs[1].node, inputs[2].node);

    let mut slots: Vec<Option<NodeId>> = vec![None; view.output_count()];
    for extractor in graph.extractors(node) {
        if let Some(slot) = slots.get_mut(extractor.index) {
            slot.get_or_insert(extractor.node);
        }
    }
    let required = |index: usize, output: &'static str| {
        slots[index].ok_or(GraphError::MissingOutputConsumer {
            op: "BatchNorm",
            node,
            index,
            output,
        })
    };
    let mean = required(OUTPUT_MEAN, "mean")?;
    let variance = required(OUTPUT_VARIANCE, "variance")?;

    let backprop = graph.batch_norm_backprop(epsilon, gamma, beta, input, mean, variance, delta)?;
    let d_input = graph.get_output_element(backprop, OUTPUT_D_INPUT)?;
    let d_gamma = graph.get_output_element(backprop, OUTPUT_D_GAMMA)?;
    let d_beta = graph.get_output_element(backprop, OUTPUT_D_BETA)?;

    adjoints.add_deltas(graph, &[(input, d_input), (gamma, d_gamma), (beta, d_beta)])
}
