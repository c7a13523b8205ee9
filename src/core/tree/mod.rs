//! Bulk-loaded B+ tree over the node store
//!
//! Leaves hold the entries and are chained left to right through sibling
//! pointers; internal nodes hold one separator per child, equal to the first
//! key of that child's subtree.

pub mod builder;
pub mod reader;

use serde::{Deserialize, Serialize};

pub use builder::{build_tree, TreeBuilder};
pub use reader::{Scan, TreeReader};

/// Shape of a built tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub entries: u64,
    pub leaves: u64,
    pub internal_nodes: u64,
    /// Nodes on a root-to-leaf path (1 for a lone leaf)
    pub depth: u32,
}
