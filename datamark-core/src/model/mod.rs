//! Entity tree model: node handles, scalar values and the document arena.

mod document;
mod scalar;

pub use document::{Document, Entity, Location, NodeKind};
pub use scalar::{NodeId, Scalar, ScalarKind};
