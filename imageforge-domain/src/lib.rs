//! Deterministic core logic: validation, synthesis, classification.

pub mod synth;
pub mod validate;
pub mod verdict;

pub use synth::{ResolvedIds, render, synthesize};
pub use validate::{ValidationError, validate};
pub use verdict::{classify, declared_attributes, recorded_attributes};
