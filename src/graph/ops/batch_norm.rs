//! Batch normalization and its backward op.
//!
//! `BatchNorm` takes `(gamma, beta, input)` and produces three outputs in a
//! fixed order: the normalized input, the per-channel mean and the
//! per-channel variance. `BatchNormBackprop` takes
//! `(gamma, beta, input, mean, variance, delta)` and produces the gradients
//! with respect to input, gamma and beta.
//!
//! Construction validates shapes and element types only; no numeric work is
//! done here.

use crate::{
    error::{GraphError, Result},
    graph::{Graph, GraphOp, Input, NodeId, Output},
    shape::Shape,
};

const BATCH_NORM: &str = "BatchNorm";
const BATCH_NORM_BACKPROP: &str = "BatchNormBackprop";

/// Output ordinals of `BatchNorm`.
pub const OUTPUT_RESULT: usize = 0;
pub const OUTPUT_MEAN: usize = 1;
pub const OUTPUT_VARIANCE: usize = 2;

/// Output ordinals of `BatchNormBackprop`.
pub const OUTPUT_D_INPUT: usize = 0;
pub const OUTPUT_D_GAMMA: usize = 1;
pub const OUTPUT_D_BETA: usize = 2;

/// Shape of the per-channel statistics of an input of shape `input_shape`,
/// or `None` if the input has no channel axis.
pub fn channel_shape(input_shape: &Shape) -> Option<Shape> {
    input_shape
        .dims()
        .get(1)
        .map(|&channels| Shape::new(vec![channels]))
}

fn batch_norm_outputs(gamma: &Output, beta: &Output, input: &Output) -> Result<Vec<Output>> {
    let input_shape = &input.shape;
    let stats_shape = channel_shape(input_shape).ok_or_else(|| {
        GraphError::shape(
            BATCH_NORM,
            "input",
            format!(
                "batch norm requires rank >= 2, got rank {} ({input_shape})",
                input_shape.rank()
            ),
        )
    })?;
    if stats_shape.dim(0) == 0 {
        return Err(GraphError::shape(
            BATCH_NORM,
            "input",
            format!("at least one channel required, channel axis 1 of {input_shape} is empty"),
        ));
    }

    for (name, operand) in [("gamma", gamma), ("beta", beta)] {
        if operand.shape.rank() != 1 {
            return Err(GraphError::shape(
                BATCH_NORM,
                name,
                format!("must have rank 1, got rank {} ({})", operand.shape.rank(), operand.shape),
            ));
        }
    }

    if gamma.dtype != beta.dtype {
        return Err(GraphError::Type {
            op: BATCH_NORM,
            operand: "beta",
            expected: gamma.dtype,
            actual: beta.dtype,
            reference: "gamma",
        });
    }

    Ok(vec![
        Output::new(input.dtype, input_shape.clone()),
        Output::new(input.dtype, stats_shape.clone()),
        Output::new(input.dtype, stats_shape),
    ])
}

fn batch_norm_backprop_outputs(operands: &[(&'static str, Output); 6]) -> Result<Vec<Output>> {
    let [gamma, beta, input, _, _, delta] = operands;
    let (_, input) = input;
    let stats_shape = match channel_shape(&input.shape) {
        Some(shape) if input.shape.rank() == 4 => shape,
        _ => {
            return Err(GraphError::shape(
                BATCH_NORM_BACKPROP,
                "input",
                format!(
                    "expected a 4D tensor (batch, channel, height, width), got rank {} ({})",
                    input.shape.rank(),
                    input.shape
                ),
            ));
        }
    };

    for (name, operand) in operands {
        if operand.dtype != input.dtype {
            return Err(GraphError::Type {
                op: BATCH_NORM_BACKPROP,
                operand: *name,
                expected: input.dtype,
                actual: operand.dtype,
                reference: "input",
            });
        }
    }

    for (name, operand) in operands {
        if matches!(*name, "input" | "delta") {
            continue;
        }
        if operand.shape != stats_shape {
            return Err(GraphError::shape(
                BATCH_NORM_BACKPROP,
                *name,
                format!(
                    "shape {} is not equal to the input channel shape {stats_shape}",
                    operand.shape
                ),
            ));
        }
    }

    let (_, delta) = delta;
    if delta.shape != input.shape {
        return Err(GraphError::shape(
            BATCH_NORM_BACKPROP,
            "delta",
            format!(
                "shape {} is expected to be equal to input shape {}",
                delta.shape, input.shape
            ),
        ));
    }

    let (_, gamma) = gamma;
    let (_, beta) = beta;
    Ok(vec![
        Output::new(input.dtype, input.shape.clone()),
        gamma.clone(),
        beta.clone(),
    ])
}

impl Graph {
    /// Adds a batch normalization node over `input`, scaled by `gamma` and
    /// shifted by `beta`.
    ///
    /// `input` must have rank >= 2 with a non-empty channel axis 1; `gamma`
    /// and `beta` must be rank 1 with the same element type.
    pub fn batch_norm(
        &self,
        epsilon: f64,
        gamma: NodeId,
        beta: NodeId,
        input: NodeId,
    ) -> Result<NodeId> {
        let outputs = batch_norm_outputs(
            &self.value_of(BATCH_NORM, "gamma", gamma)?,
            &self.value_of(BATCH_NORM, "beta", beta)?,
            &self.value_of(BATCH_NORM, "input", input)?,
        )?;
        Ok(self.push_node(
            GraphOp::BatchNorm { epsilon },
            vec![Input::value(gamma), Input::value(beta), Input::value(input)],
            outputs,
        ))
    }

    /// Adds the backward node of batch normalization.
    ///
    /// `input` must be 4D; all six operands share the element type of
    /// `input`; `gamma`, `beta`, `mean` and `variance` have the input channel
    /// shape and `delta` has the input shape.
    #[allow(clippy::too_many_arguments)]
    pub fn batch_norm_backprop(
        &self,
        epsilon: f64,
        gamma: NodeId,
        beta: NodeId,
        input: NodeId,
        mean: NodeId,
        variance: NodeId,
        delta: NodeId,
    ) -> Result<NodeId> {
        let operands = [
            ("gamma", self.value_of(BATCH_NORM_BACKPROP, "gamma", gamma)?),
            ("beta", self.value_of(BATCH_NORM_BACKPROP, "beta", beta)?),
            ("input", self.value_of(BATCH_NORM_BACKPROP, "input", input)?),
            ("mean", self.value_of(BATCH_NORM_BACKPROP, "mean", mean)?),
            ("variance", self.value_of(BATCH_NORM_BACKPROP, "variance", variance)?),
            ("delta", self.value_of(BATCH_NORM_BACKPROP, "delta", delta)?),
        ];
        let outputs = batch_norm_backprop_outputs(&operands)?;
        Ok(self.push_node(
            GraphOp::BatchNormBackprop { epsilon },
            [gamma, beta, input, mean, variance, delta]
                .map(Input::value)
                .to_vec(),
            outputs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use rstest::rstest;

    struct Operands {
        gamma: NodeId,
        beta: NodeId,
        input: NodeId,
    }

    fn operands(graph: &Graph, input: &[usize], gamma: &[usize], beta: &[usize]) -> Operands {
        Operands {
            gamma: graph.parameter(DType::F32, gamma.to_vec()).id,
            beta: graph.parameter(DType::F32, beta.to_vec()).id,
            input: graph.parameter(DType::F32, input.to_vec()).id,
        }
    }

    #[rstest]
    #[case(&[8, 3], 3)]
    #[case(&[8, 3, 4, 4], 3)]
    #[case(&[2, 16, 5], 16)]
    #[case(&[1, 1, 1, 1, 1], 1)]
    fn test_batch_norm_outputs(#[case] input: &[usize], #[case] channels: usize) {
        let graph = Graph::new();
        let ops = operands(&graph, input, &[channels], &[channels]);
        let bn = graph.batch_norm(1e-5, ops.gamma, ops.beta, ops.input).unwrap();
        let view = graph.get_view(bn);

        let outputs = view.outputs();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[OUTPUT_RESULT].shape, Shape::new(input.to_vec()));
        assert_eq!(outputs[OUTPUT_MEAN].shape, Shape::from([channels]));
        assert_eq!(outputs[OUTPUT_VARIANCE].shape, Shape::from([channels]));
        assert!(outputs.iter().all(|o| o.dtype == DType::F32));
        assert_eq!(view.epsilon(), Some(1e-5));
        assert_eq!(view.input_node(2), Some(ops.input));
    }

    #[rstest]
    #[case::rank_one(&[8], &[8], &[8], "input")]
    #[case::scalar_input(&[], &[1], &[1], "input")]
    #[case::no_channels(&[8, 0, 4], &[0], &[0], "input")]
    #[case::gamma_rank(&[8, 3], &[1, 3], &[3], "gamma")]
    #[case::beta_rank(&[8, 3], &[3], &[], "beta")]
    fn test_batch_norm_shape_errors(
        #[case] input: &[usize],
        #[case] gamma: &[usize],
        #[case] beta: &[usize],
        #[case] operand: &str,
    ) {
        let graph = Graph::new();
        let ops = operands(&graph, input, gamma, beta);
        let before = graph.len();
        let err = graph
            .batch_norm(1e-3, ops.gamma, ops.beta, ops.input)
            .unwrap_err();
        assert!(matches!(err, GraphError::Shape { op: "BatchNorm", .. }), "{err}");
        assert_eq!(err.operand(), Some(operand));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_channel_shape() {
        assert_eq!(channel_shape(&Shape::from([8, 3, 4, 4])), Some(Shape::from([3])));
        assert_eq!(channel_shape(&Shape::from([8, 0])), Some(Shape::from([0])));
        assert_eq!(channel_shape(&Shape::from([8])), None);
        assert_eq!(channel_shape(&Shape::default()), None);
    }

    #[test]
    fn test_batch_norm_rank_checked_before_channels() {
        let graph = Graph::new();
        let ops = operands(&graph, &[0], &[3], &[3]);
        let err = graph
            .batch_norm(1e-3, ops.gamma, ops.beta, ops.input)
            .unwrap_err();
        assert!(err.to_string().contains("rank >= 2"), "{err}");
    }

    #[test]
    fn test_batch_norm_gamma_beta_type_mismatch() {
        let graph = Graph::new();
        let gamma = graph.parameter(DType::F32, [3]).id;
        let beta = graph.parameter(DType::F64, [3]).id;
        let input = graph.parameter(DType::F32, [8, 3]).id;
        let err = graph.batch_norm(1e-3, gamma, beta, input).unwrap_err();
        assert_eq!(
            err,
            GraphError::Type {
                op: "BatchNorm",
                operand: "beta",
                expected: DType::F32,
                actual: DType::F64,
                reference: "gamma",
            }
        );
    }

    #[test]
    fn test_batch_norm_outputs_follow_input_type() {
        // gamma/beta type is only checked against each other
        let graph = Graph::new();
        let gamma = graph.parameter(DType::F32, [3]).id;
        let beta = graph.parameter(DType::F32, [3]).id;
        let input = graph.parameter(DType::F16, [8, 3]).id;
        let bn = graph.batch_norm(1e-3, gamma, beta, input).unwrap();
        assert!(graph.get_view(bn).outputs().iter().all(|o| o.dtype == DType::F16));
    }

    #[test]
    fn test_batch_norm_rejects_multi_output_argument() {
        let graph = Graph::new();
        let ops = operands(&graph, &[8, 3], &[3], &[3]);
        let bn = graph.batch_norm(1e-3, ops.gamma, ops.beta, ops.input).unwrap();
        let err = graph.batch_norm(1e-3, ops.gamma, ops.beta, bn).unwrap_err();
        assert_eq!(
            err,
            GraphError::MultipleOutputs {
                op: "BatchNorm",
                operand: "input",
                node: bn,
                count: 3,
            }
        );
    }

    #[test]
    fn test_batch_norm_copy_with_new_args() {
        let graph = Graph::new();
        let ops = operands(&graph, &[8, 3, 4, 4], &[3], &[3]);
        let bn = graph.batch_norm(0.25, ops.gamma, ops.beta, ops.input).unwrap();

        let replacement = operands(&graph, &[2, 3, 7, 7], &[3], &[3]);
        let copy = graph
            .copy_with_new_args(bn, &[replacement.gamma, replacement.beta, replacement.input])
            .unwrap();
        let fresh = graph
            .batch_norm(0.25, replacement.gamma, replacement.beta, replacement.input)
            .unwrap();

        assert_ne!(copy, bn);
        assert_eq!(graph.get_view(copy).outputs(), graph.get_view(fresh).outputs());
        assert_eq!(graph.get_view(copy).epsilon(), Some(0.25));
        // the original keeps its inputs
        assert_eq!(graph.get_view(bn).input_node(2), Some(ops.input));
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(4)]
    fn test_batch_norm_copy_arity(#[case] count: usize) {
        let graph = Graph::new();
        let ops = operands(&graph, &[8, 3], &[3], &[3]);
        let bn = graph.batch_norm(1e-3, ops.gamma, ops.beta, ops.input).unwrap();
        let args = vec![ops.gamma; count];
        assert_eq!(
            graph.copy_with_new_args(bn, &args),
            Err(GraphError::Arity {
                op: "BatchNorm",
                expected: 3,
                actual: count,
            })
        );
    }

    #[test]
    fn test_batch_norm_copy_revalidates() {
        let graph = Graph::new();
        let ops = operands(&graph, &[8, 3], &[3], &[3]);
        let bn = graph.batch_norm(1e-3, ops.gamma, ops.beta, ops.input).unwrap();
        let flat = graph.parameter(DType::F32, [24]).id;
        let err = graph
            .copy_with_new_args(bn, &[ops.gamma, ops.beta, flat])
            .unwrap_err();
        assert_eq!(err.operand(), Some("input"));
    }

    struct BackpropOperands {
        ids: [NodeId; 6],
    }

    fn backprop_operands(
        graph: &Graph,
        dtypes: [DType; 6],
        shapes: [&[usize]; 6],
    ) -> BackpropOperands {
        let mut ids = [NodeId(0); 6];
        for (i, (dtype, shape)) in dtypes.into_iter().zip(shapes).enumerate() {
            ids[i] = graph.parameter(dtype, shape.to_vec()).id;
        }
        BackpropOperands { ids }
    }

    const VALID_SHAPES: [&[usize]; 6] = [&[3], &[3], &[8, 3, 4, 4], &[3], &[3], &[8, 3, 4, 4]];

    fn build_backprop(graph: &Graph, ops: &BackpropOperands) -> Result<NodeId> {
        let [gamma, beta, input, mean, variance, delta] = ops.ids;
        graph.batch_norm_backprop(1e-3, gamma, beta, input, mean, variance, delta)
    }

    #[test]
    fn test_batch_norm_backprop_outputs() {
        let graph = Graph::new();
        let ops = backprop_operands(&graph, [DType::F32; 6], VALID_SHAPES);
        let bbn = build_backprop(&graph, &ops).unwrap();
        let outputs = graph.get_view(bbn).outputs();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[OUTPUT_D_INPUT].shape, Shape::from([8, 3, 4, 4]));
        assert_eq!(outputs[OUTPUT_D_GAMMA].shape, Shape::from([3]));
        assert_eq!(outputs[OUTPUT_D_BETA].shape, Shape::from([3]));
        assert_eq!(graph.get_view(bbn).inputs().len(), 6);
    }

    #[rstest]
    #[case(&[8, 3])]
    #[case(&[8, 3, 4])]
    #[case(&[8, 3, 4, 4, 1])]
    fn test_batch_norm_backprop_requires_4d(#[case] input: &[usize]) {
        let graph = Graph::new();
        let mut shapes: [&[usize]; 6] = VALID_SHAPES;
        shapes[2] = input;
        shapes[5] = input;
        let ops = backprop_operands(&graph, [DType::F32; 6], shapes);
        let err = build_backprop(&graph, &ops).unwrap_err();
        assert!(
            matches!(err, GraphError::Shape { op: "BatchNormBackprop", operand: "input", .. }),
            "{err}"
        );
    }

    #[rstest]
    #[case(0, "gamma")]
    #[case(1, "beta")]
    #[case(3, "mean")]
    #[case(4, "variance")]
    #[case(5, "delta")]
    fn test_batch_norm_backprop_type_mismatch(#[case] position: usize, #[case] name: &str) {
        let graph = Graph::new();
        let mut dtypes = [DType::F32; 6];
        dtypes[position] = DType::F64;
        let ops = backprop_operands(&graph, dtypes, VALID_SHAPES);
        let before = graph.len();
        let err = build_backprop(&graph, &ops).unwrap_err();
        assert!(matches!(err, GraphError::Type { actual: DType::F64, .. }), "{err}");
        assert_eq!(err.operand(), Some(name));
        assert!(err.to_string().contains(name));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_batch_norm_backprop_input_type_reported_on_first_operand() {
        // every other operand disagrees with input; gamma is checked first
        let graph = Graph::new();
        let mut dtypes = [DType::F32; 6];
        dtypes[2] = DType::F16;
        let ops = backprop_operands(&graph, dtypes, VALID_SHAPES);
        let err = build_backprop(&graph, &ops).unwrap_err();
        assert_eq!(err.operand(), Some("gamma"));
    }

    #[rstest]
    #[case(0, &[4], "gamma")]
    #[case(1, &[1, 3], "beta")]
    #[case(3, &[8], "mean")]
    #[case(4, &[], "variance")]
    #[case(5, &[8, 3, 4, 5], "delta")]
    fn test_batch_norm_backprop_shape_mismatch(
        #[case] position: usize,
        #[case] shape: &[usize],
        #[case] name: &str,
    ) {
        let graph = Graph::new();
        let mut shapes: [&[usize]; 6] = VALID_SHAPES;
        shapes[position] = shape;
        let ops = backprop_operands(&graph, [DType::F32; 6], shapes);
        let err = build_backprop(&graph, &ops).unwrap_err();
        assert!(matches!(err, GraphError::Shape { .. }), "{err}");
        assert_eq!(err.operand(), Some(name));
    }

    #[test]
    fn test_batch_norm_backprop_copy_with_new_args() {
        let graph = Graph::new();
        let ops = backprop_operands(&graph, [DType::F32; 6], VALID_SHAPES);
        let bbn = build_backprop(&graph, &ops).unwrap();

        let copy = graph.copy_with_new_args(bbn, &ops.ids).unwrap();
        assert_ne!(copy, bbn);
        assert_eq!(graph.get_view(copy).outputs(), graph.get_view(bbn).outputs());
        assert_eq!(graph.get_view(copy).epsilon(), Some(1e-3));

        assert_eq!(
            graph.copy_with_new_args(bbn, &ops.ids[..3]),
            Err(GraphError::Arity {
                op: "BatchNormBackprop",
                expected: 6,
                actual: 3,
            })
        );
    }
}
