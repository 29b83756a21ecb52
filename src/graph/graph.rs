use std::cell::RefCell;

use crate::{
    dtype::DType,
    error::{GraphError, Result},
    graph::{
        node::{Input, NodeData, NodeId, Output},
        op::GraphOp,
        view::{ExtractorView, NodeView},
    },
    shape::Shape,
};

/// Owns all the nodes of a computation graph.
///
/// The `Graph` uses interior mutability (`RefCell`) to allow nodes to be added
/// while callers hold shared references to it. Nodes are only ever appended;
/// cloning a node with new inputs creates a new node.
#[derive(Default, Debug)]
pub struct Graph {
    nodes: RefCell<Vec<NodeData>>,
}

impl Graph {
    /// Creates a new, empty computation graph.
    pub fn new() -> Self {
        Graph {
            nodes: RefCell::new(Vec::new()),
        }
    }

    /// Appends a node whose inputs and outputs have already been validated.
    pub(crate) fn push_node(
        &self,
        op: GraphOp,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
    ) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        log::trace!("{id} = {}{:?} -> {} output(s)", op.name(), inputs, outputs.len());
        nodes.push(NodeData {
            op,
            inputs,
            outputs,
        });
        id
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.len()
    }

    /// Gets a `NodeView` for a given `NodeId`.
    ///
    /// The view panics on access if `id` does not belong to this graph.
    pub fn get_view(&self, id: NodeId) -> NodeView<'_> {
        NodeView { id, graph: self }
    }

    /// Returns a copy of the node's data.
    pub fn node(&self, id: NodeId) -> Result<NodeData> {
        self.nodes
            .borrow()
            .get(id.0)
            .cloned()
            .ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> R {
        f(&self.nodes.borrow()[id.0])
    }

    /// Adds a new parameter (leaf) node to the graph.
    pub fn parameter(&self, dtype: DType, shape: impl Into<Shape>) -> NodeView<'_> {
        let id = self.push_node(
            GraphOp::Parameter,
            vec![],
            vec![Output::new(dtype, shape.into())],
        );
        self.get_view(id)
    }

    /// Resolves a value argument to the single output of `id`.
    pub(crate) fn value_of(
        &self,
        op: &'static str,
        operand: &'static str,
        id: NodeId,
    ) -> Result<Output> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(id.0).ok_or(GraphError::UnknownNode(id))?;
        match node.outputs.as_slice() {
            [output] => Ok(output.clone()),
            outputs => Err(GraphError::MultipleOutputs {
                op,
                operand,
                node: id,
                count: outputs.len(),
            }),
        }
    }

    /// Creates an extractor exposing output `n` of `node` as a single value.
    pub fn get_output_element(&self, node: NodeId, n: usize) -> Result<NodeId> {
        let output = {
            let nodes = self.nodes.borrow();
            let data = nodes.get(node.0).ok_or(GraphError::UnknownNode(node))?;
            data.outputs
                .get(n)
                .cloned()
                .ok_or(GraphError::OutputIndex {
                    node,
                    index: n,
                    count: data.outputs.len(),
                })?
        };
        Ok(self.push_node(
            GraphOp::GetOutputElement { n },
            vec![Input { node, index: n }],
            vec![output],
        ))
    }

    /// Element-wise sum of two values with identical element type and shape.
    pub fn add(&self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        const OP: &str = "Add";
        let lhs_out = self.value_of(OP, "lhs", lhs)?;
        let rhs_out = self.value_of(OP, "rhs", rhs)?;
        if lhs_out.dtype != rhs_out.dtype {
            return Err(GraphError::Type {
                op: OP,
                operand: "rhs",
                expected: lhs_out.dtype,
                actual: rhs_out.dtype,
                reference: "lhs",
            });
        }
        if lhs_out.shape != rhs_out.shape {
            return Err(GraphError::shape(
                OP,
                "rhs",
                format!("shape {} does not match lhs shape {}", rhs_out.shape, lhs_out.shape),
            ));
        }
        Ok(self.push_node(
            GraphOp::Add,
            vec![Input::value(lhs), Input::value(rhs)],
            vec![lhs_out],
        ))
    }

    /// Returns the nodes having at least one input edge to `id`, in ascending
    /// id order.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, node)| node.inputs.iter().any(|input| input.node == id))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Returns the extractors bound to outputs of `id`, in ascending id order.
    pub fn extractors(&self, id: NodeId) -> Vec<ExtractorView> {
        self.consumers(id)
            .into_iter()
            .filter_map(|consumer| self.get_view(consumer).as_extractor())
            .filter(|extractor| extractor.source == id)
            .collect()
    }

    /// Clones `id` with its inputs replaced by `new_args`, re-running the
    /// op's full validation. The original node is left untouched.
    pub fn copy_with_new_args(&self, id: NodeId, new_args: &[NodeId]) -> Result<NodeId> {
        let data = self.node(id)?;
        let expected = data.op.arity();
        if new_args.len() != expected {
            return Err(GraphError::Arity {
                op: data.op.name(),
                expected,
                actual: new_args.len(),
            });
        }
        match data.op {
            GraphOp::Parameter => {
                let output = &data.outputs[0];
                Ok(self.parameter(output.dtype, output.shape.clone()).id)
            }
            GraphOp::Add => self.add(new_args[0], new_args[1]),
            GraphOp::GetOutputElement { n } => self.get_output_element(new_args[0], n),
            GraphOp::BatchNorm { epsilon } => {
                self.batch_norm(epsilon, new_args[0], new_args[1], new_args[2])
            }
            GraphOp::BatchNormBackprop { epsilon } => self.batch_norm_backprop(
                epsilon,
                new_args[0],
                new_args[1],
                new_args[2],
                new_args[3],
                new_args[4],
                new_args[5],
            ),
        }
    }
}
