//! bnorm-ir: batch normalization in a typed dataflow-graph IR
//!
//! Graph builders construct `BatchNorm` nodes whose shapes and element types
//! are validated at construction. A reverse-mode pass then turns every
//! `BatchNorm` into a `BatchNormBackprop` subgraph and accumulates the
//! resulting gradients per node.
//!
//! # Architecture
//!
//! - **dtype** / **shape**: element types and static shapes
//! - **graph**: arena graph, extractors, op constructors and traversal
//! - **autograd**: adjoint accumulator, per-op adjoint rules and the
//!   backward pass driver
//! - **error**: the typed error surface shared by all of the above
//!
//! # Example
//!
//! ```
//! use bnorm_ir::prelude::*;
//!
//! let graph = Graph::new();
//! let gamma = graph.parameter(DType::F32, [3]).id;
//! let beta = graph.parameter(DType::F32, [3]).id;
//! let x = graph.parameter(DType::F32, [8, 3, 4, 4]).id;
//!
//! let bn = graph.batch_norm(1e-5, gamma, beta, x)?;
//! let y = graph.get_output_element(bn, 0)?;
//! graph.get_output_element(bn, 1)?;
//! graph.get_output_element(bn, 2)?;
//!
//! let seed = graph.parameter(DType::F32, [8, 3, 4, 4]).id;
//! let adjoints = backprop(&graph, y, seed)?;
//! let d_gamma = adjoints.get(gamma).unwrap();
//! assert_eq!(graph.get_view(d_gamma).shape()?, Shape::from([3]));
//! # Ok::<(), bnorm_ir::GraphError>(())
//! ```

pub mod autograd;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod shape;

pub use autograd::{Adjoints, backprop, generate_adjoints};
pub use dtype::DType;
pub use error::{GraphError, Result};
pub use graph::{Graph, GraphOp, NodeId, NodeView};
pub use shape::Shape;

/// Prelude module with commonly used types and functions
pub mod prelude {
    pub use crate::autograd::{Adjoints, backprop};
    pub use crate::dtype::DType;
    pub use crate::error::{GraphError, Result};
    pub use crate::graph::{ExtractorView, Graph, GraphOp, NodeId, NodeView, Output};
    pub use crate::shape::Shape;
}
