//! Error types for graph construction and differentiation

use thiserror::Error;

use crate::dtype::DType;
use crate::graph::{NodeId, Output};

/// Errors raised while building or differentiating a graph.
///
/// Every failure is reported at the point of construction; a failed
/// construction appends nothing to the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Rank or dimension mismatch
    #[error("{op}: shape error on `{operand}`: {message}")]
    Shape {
        op: &'static str,
        operand: &'static str,
        message: String,
    },

    /// Element type mismatch
    #[error(
        "{op}: element type of `{operand}` is {actual}, expected {expected} to match `{reference}`"
    )]
    Type {
        op: &'static str,
        operand: &'static str,
        expected: DType,
        actual: DType,
        reference: &'static str,
    },

    /// Wrong number of replacement arguments on clone
    #[error("{op}: incorrect number of new arguments: expected {expected}, got {actual}")]
    Arity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Differentiation ran before a required output was consumed
    #[error(
        "{op} node {node}: no extractor bound to output {index} ({output}); \
         it must be consumed before differentiation"
    )]
    MissingOutputConsumer {
        op: &'static str,
        node: NodeId,
        index: usize,
        output: &'static str,
    },

    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    /// A multi-output node was passed where a single value is required
    #[error(
        "{op}: `{operand}` refers to node {node} with {count} outputs; \
         bind one of them with get_output_element"
    )]
    MultipleOutputs {
        op: &'static str,
        operand: &'static str,
        node: NodeId,
        count: usize,
    },

    #[error("output index {index} out of range for node {node} with {count} outputs")]
    OutputIndex {
        node: NodeId,
        index: usize,
        count: usize,
    },

    /// Gradient contribution differs in type or shape from the value it
    /// differentiates
    #[error("adjoint of {node}: contribution {delta} is {actual}, expected {expected}")]
    AdjointMismatch {
        node: NodeId,
        delta: NodeId,
        expected: Output,
        actual: Output,
    },

    #[error("{op} has no adjoint rule")]
    NotDifferentiable { op: &'static str },
}

impl GraphError {
    pub(crate) fn shape(
        op: &'static str,
        operand: &'static str,
        message: impl Into<String>,
    ) -> Self {
        GraphError::Shape {
            op,
            operand,
            message: message.into(),
        }
    }

    /// Name of the operand the error refers to, if any.
    pub fn operand(&self) -> Option<&'static str> {
        match self {
            GraphError::Shape { operand, .. }
            | GraphError::Type { operand, .. }
            | GraphError::MultipleOutputs { operand, .. } => Some(*operand),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
