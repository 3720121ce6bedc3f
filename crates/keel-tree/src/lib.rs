//! Persistent copy-on-write key tree for the Keel database core.
//!
//! Every transaction mutates a private [`PersistentTree`] built over the
//! committed root it snapshotted. Mutations copy only the path from the root
//! to the touched key; untouched subtrees are shared by [`NodeRef`] with the
//! committed version. The nodes created by a transaction accumulate in the
//! tree's *delta*, which travels with the tree into the after-image matching
//! machinery once the transaction commits.

pub mod error;
pub mod node;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use node::{Node, NodeRef};
pub use tree::{PersistentTree, TreeVersion};
