//! Domain model for converted point attributes.
//!
//! # Responsibility
//! - Define point value objects and the rect entity that embeds them.
//!
//! # Invariants
//! - Point values are immutable; entities replace them instead.
//! - Both rect variants share one shape and one behavior.

pub mod point;
pub mod rect;
