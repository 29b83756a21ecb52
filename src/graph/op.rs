/// An enumeration of the operations a graph node can perform.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    /// A leaf value supplied from outside the graph.
    Parameter,
    /// Element-wise sum of two values of identical type and shape.
    Add,
    /// Exposes output `n` of a multi-output node as a single value.
    GetOutputElement { n: usize },
    /// Batch normalization. Outputs: normalized input, mean, variance.
    BatchNorm { epsilon: f64 },
    /// Gradient of batch normalization. Outputs: d/d-input, d/d-gamma, d/d-beta.
    BatchNormBackprop { epsilon: f64 },
}

impl GraphOp {
    /// Returns the operation name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            GraphOp::Parameter => "Parameter",
            GraphOp::Add => "Add",
            GraphOp::GetOutputElement { .. } => "GetOutputElement",
            GraphOp::BatchNorm { .. } => "BatchNorm",
            GraphOp::BatchNormBackprop { .. } => "BatchNormBackprop",
        }
    }

    /// Returns the number of inputs the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            GraphOp::Parameter => 0,
            GraphOp::GetOutputElement { .. } => 1,
            GraphOp::Add => 2,
            GraphOp::BatchNorm { .. } => 3,
            GraphOp::BatchNormBackprop { .. } => 6,
        }
    }

    /// Returns `true` if the operation is an output extractor.
    pub fn is_extractor(&self) -> bool {
        matches!(self, GraphOp::GetOutputElement { .. })
    }

    /// Returns the epsilon attribute of batch normalization ops.
    pub fn epsilon(&self) -> Option<f64> {
        match self {
            GraphOp::BatchNorm { epsilon } | GraphOp::BatchNormBackprop { epsilon } => {
                Some(*epsilon)
            }
            _ => None,
        }
    }
}
