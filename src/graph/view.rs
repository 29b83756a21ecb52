use super::{Graph, GraphOp, Input, NodeId, Output};
use crate::dtype::DType;
use crate::error::{GraphError, Result};
use crate::shape::Shape;

/// A temporary, lightweight handle to a node in the graph.
///
/// # Examples
///
/// ```
/// use bnorm_ir::{DType, Graph};
///
/// let graph = Graph::new();
/// let x = graph.parameter(DType::F32, [8, 3]);
/// assert_eq!(x.shape().unwrap().rank(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub id: NodeId,
    pub graph: &'a Graph,
}

/// An extractor node together with the output it binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorView {
    /// The extractor node itself.
    pub node: NodeId,
    /// The multi-output node it reads from.
    pub source: NodeId,
    /// The output ordinal it binds.
    pub index: usize,
}

impl<'a> NodeView<'a> {
    /// Returns the operation of the node.
    pub fn op(&self) -> GraphOp {
        self.graph.with_node(self.id, |n| n.op.clone())
    }

    /// Returns the input edges of the node.
    pub fn inputs(&self) -> Vec<Input> {
        self.graph.with_node(self.id, |n| n.inputs.clone())
    }

    /// Returns the producer of the `i`-th input.
    pub fn input_node(&self, i: usize) -> Option<NodeId> {
        self.graph.with_node(self.id, |n| n.inputs.get(i).map(|input| input.node))
    }

    pub fn outputs(&self) -> Vec<Output> {
        self.graph.with_node(self.id, |n| n.outputs.clone())
    }

    pub fn output_count(&self) -> usize {
        self.graph.with_node(self.id, |n| n.outputs.len())
    }

    /// Returns output `index`.
    pub fn output(&self, index: usize) -> Result<Output> {
        self.graph.with_node(self.id, |n| {
            n.outputs
                .get(index)
                .cloned()
                .ok_or(GraphError::OutputIndex {
                    node: self.id,
                    index,
                    count: n.outputs.len(),
                })
        })
    }

    /// Returns the only output of a single-output node.
    pub fn value(&self) -> Result<Output> {
        self.graph.value_of(self.op().name(), "self", self.id)
    }

    pub fn shape(&self) -> Result<Shape> {
        self.value().map(|o| o.shape)
    }

    pub fn element_type(&self) -> Result<DType> {
        self.value().map(|o| o.dtype)
    }

    pub fn epsilon(&self) -> Option<f64> {
        self.graph.with_node(self.id, |n| n.op.epsilon())
    }

    pub fn consumers(&self) -> Vec<NodeId> {
        self.graph.consumers(self.id)
    }

    /// Returns the bound output if this node is an extractor.
    pub fn as_extractor(&self) -> Option<ExtractorView> {
        self.graph.with_node(self.id, |n| match (&n.op, n.inputs.as_slice()) {
            (GraphOp::GetOutputElement { n: index }, [source]) => Some(ExtractorView {
                node: self.id,
                source: source.node,
                index: *index,
            }),
            _ => None,
        })
    }
}
