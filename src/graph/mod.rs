//! Arena-based dataflow graph.
//!
//! Nodes live in a central arena owned by [`Graph`] and refer to each other by
//! [`NodeId`]. A node is shared by every consumer holding its id and is never
//! mutated once appended.

#[allow(clippy::module_inception)]
mod graph;
pub mod node;
pub mod op;
pub mod ops;
pub mod traversal;
mod view;

pub use graph::Graph;
pub use node::{Input, NodeData, NodeId, Output};
pub use op::GraphOp;
pub use traversal::{graph_to_string, reverse_topological_order, topological_order};
pub use view::{ExtractorView, NodeView};
