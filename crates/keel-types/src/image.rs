use serde::{Deserialize, Serialize};

use crate::Position;

/// The serialized post-commit tree state for one committed intention,
/// referencing it by log position. A well-formed after-image lands after its
/// intention, so `intention_ref < own_position` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterImageBody {
    intention_ref: Position,
    tree: Vec<u8>,
}

impl AfterImageBody {
    pub fn new(intention_ref: Position, tree: Vec<u8>) -> Self {
        Self {
            intention_ref,
            tree,
        }
    }

    /// The log position of the intention this image post-images.
    pub fn intention_ref(&self) -> Position {
        self.intention_ref
    }

    pub fn tree(&self) -> &[u8] {
        &self.tree
    }

    /// Whether this image, stored at `own_position`, references an earlier
    /// intention as required.
    pub fn is_well_formed(&self, own_position: Position) -> bool {
        self.intention_ref < own_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_requires_earlier_intention() {
        let body = AfterImageBody::new(4, vec![1, 2, 3]);
        assert!(body.is_well_formed(5));
        assert!(!body.is_well_formed(4));
        assert!(!body.is_well_formed(3));
    }

    #[test]
    fn accessors() {
        let body = AfterImageBody::new(2, vec![0xAA]);
        assert_eq!(body.intention_ref(), 2);
        assert_eq!(body.tree(), &[0xAA]);
    }
}
