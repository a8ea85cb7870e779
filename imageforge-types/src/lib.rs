//! Shared DTOs (schemas-as-code) for the imageforge workspace.
//!
//! # Design constraints
//! - Templates and results are serialized across process boundaries.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod params;
pub mod result;
pub mod spec;
pub mod template;

/// Schema identifiers.
pub mod schema {
    pub const IMAGEFORGE_RESULT_V1: &str = "imageforge.result.v1";
}
