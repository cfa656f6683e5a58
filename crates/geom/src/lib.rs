//! Geometry: axis-aligned boxes and a bulk-loaded R-tree style structure.
//!
//! # Invariants
//! - An internal node's box always equals the combination of its children's boxes.
//! - Below the root, every node holds between `min_children` and `max_children`
//!   children.
//!
//! The tree is built in one pass from a full item set and is never mutated
//! afterwards. Rebuild it when the item set changes.

mod aabb;
mod node;
mod split;
mod tree;

pub use aabb::BoundingBox;
pub use node::{Node, NodeKind};
pub use split::{Axis, SplitStrategy, TreeError};
pub use tree::BulkTree;
