use std::fmt;

use crate::{dtype::DType, graph::op::GraphOp, shape::Shape};

/// A unique identifier for a node within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An input edge: output `index` of the producer `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Input {
    pub node: NodeId,
    pub index: usize,
}

impl Input {
    /// Edge to the only output of a single-output node.
    pub fn value(node: NodeId) -> Self {
        Input { node, index: 0 }
    }
}

/// One typed result slot of a node. Its ordinal is its position in
/// `NodeData::outputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub dtype: DType,
    pub shape: Shape,
}

impl Output {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Output { dtype, shape }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// The data associated with a single node in the computation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// The operation performed by this node.
    pub op: GraphOp,
    /// Edges to the producers this node consumes.
    pub inputs: Vec<Input>,
    /// Typed outputs, in ordinal order.
    pub outputs: Vec<Output>,
}
