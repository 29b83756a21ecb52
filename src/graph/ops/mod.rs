//! Operation constructors with construction-time validation.

pub mod batch_norm;
