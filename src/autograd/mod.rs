//! Reverse-mode differentiation over the graph.
//!
//! Each op contributes an adjoint rule that, given the gradient flowing into
//! its primary output, appends the backward subgraph and records gradient
//! contributions for its inputs in an [`Adjoints`] accumulator.

mod adjoints;
mod backward;
mod grad_fn;

pub use adjoints::Adjoints;
pub use backward::backprop;
pub use grad_fn::generate_adjoints;
