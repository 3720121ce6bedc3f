use std::cmp::Ordering;
use std::sync::Arc;

use keel_types::{Position, Token};

use crate::error::{TreeError, TreeResult};
use crate::node::{Node, NodeRef};

/// Which version of the database a tree represents.
///
/// A tree starts out tentative: private to one uncommitted transaction and
/// identified by its token. Once the transaction's intention lands in the
/// log, the tree is promoted and carries the assigned position instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeVersion {
    Tentative { token: Token },
    Committed { intention_position: Position },
}

/// A persistent (path-copying) binary search tree over byte-string keys.
///
/// Mutation copies the root-to-key path and shares untouched subtrees with
/// the snapshotted version; freshly created nodes accumulate in the tree's
/// delta, handed off with the tree when the owning transaction commits.
#[derive(Debug)]
pub struct PersistentTree {
    root: Option<NodeRef>,
    version: TreeVersion,
    after_image_position: Option<Position>,
    delta: Vec<NodeRef>,
    mutations: usize,
}

impl PersistentTree {
    /// A tentative tree sharing `root` with the committed version it
    /// snapshotted.
    pub fn tentative(root: Option<NodeRef>, token: Token) -> Self {
        Self {
            root,
            version: TreeVersion::Tentative { token },
            after_image_position: None,
            delta: Vec::new(),
            mutations: 0,
        }
    }

    /// Rebuild a committed tree, balanced, from bytes produced by
    /// [`serialize`](PersistentTree::serialize).
    pub fn restore(data: &[u8], intention_position: Position) -> TreeResult<Self> {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(data)
            .map_err(|e| TreeError::Deserialization(e.to_string()))?;
        if pairs.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(TreeError::Deserialization(
                "tree image keys are not strictly sorted".into(),
            ));
        }
        Ok(Self {
            root: build_balanced(&pairs),
            version: TreeVersion::Committed { intention_position },
            after_image_position: None,
            delta: Vec::new(),
            mutations: 0,
        })
    }

    pub fn version(&self) -> TreeVersion {
        self.version
    }

    pub fn root(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    /// Look up `key`, seeing this tree's own mutations.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match key.cmp(&n.key) {
                Ordering::Equal => return Some(&n.value),
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Greater => node = n.right.as_deref(),
            }
        }
        None
    }

    /// Insert or overwrite `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.mutations += 1;
        self.root = Some(insert_at(self.root.as_ref(), key, value, &mut self.delta));
    }

    /// Remove `key`. Returns whether the key was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.mutations += 1;
        let (root, removed) = remove_at(self.root.as_ref(), key, &mut self.delta);
        if removed {
            self.root = root;
        }
        removed
    }

    /// `true` if no `put` or `delete` has been issued against this tree.
    pub fn is_read_only(&self) -> bool {
        self.mutations == 0
    }

    /// Nodes created by this tree's mutations, in creation order. Leaves the
    /// tree's delta empty.
    pub fn take_delta(&mut self) -> Vec<NodeRef> {
        std::mem::take(&mut self.delta)
    }

    /// Stamp a tentative tree with the log position its intention was
    /// assigned. Promoting twice is a caller bug and panics.
    pub fn promote(&mut self, intention_position: Position) {
        assert!(
            matches!(self.version, TreeVersion::Tentative { .. }),
            "tree is already committed"
        );
        self.version = TreeVersion::Committed { intention_position };
    }

    /// The log position of the intention that produced this tree. Panics if
    /// the tree is still tentative.
    pub fn intention_position(&self) -> Position {
        match self.version {
            TreeVersion::Committed { intention_position } => intention_position,
            TreeVersion::Tentative { .. } => panic!("tree is still tentative"),
        }
    }

    /// The position of this tree's primary after-image, once resolved.
    pub fn after_image_position(&self) -> Option<Position> {
        self.after_image_position
    }

    /// Record the primary after-image position. The matcher pairs each tree
    /// at most once; a second call panics.
    pub fn set_after_image_position(&mut self, position: Position) {
        assert!(
            self.after_image_position.is_none(),
            "after-image position already recorded"
        );
        self.after_image_position = Some(position);
    }

    /// All key/value pairs in key order.
    pub fn export(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        fn walk(node: Option<&NodeRef>, out: &mut Vec<(Vec<u8>, Vec<u8>)>) {
            if let Some(n) = node {
                walk(n.left.as_ref(), out);
                out.push((n.key.clone(), n.value.clone()));
                walk(n.right.as_ref(), out);
            }
        }
        let mut out = Vec::new();
        walk(self.root.as_ref(), &mut out);
        out
    }

    /// Serialize the full tree state for an after-image payload.
    pub fn serialize(&self) -> TreeResult<Vec<u8>> {
        bincode::serialize(&self.export()).map_err(|e| TreeError::Serialization(e.to_string()))
    }
}

fn fresh(
    delta: &mut Vec<NodeRef>,
    key: Vec<u8>,
    value: Vec<u8>,
    left: Option<NodeRef>,
    right: Option<NodeRef>,
) -> NodeRef {
    let node = Arc::new(Node {
        key,
        value,
        left,
        right,
    });
    delta.push(Arc::clone(&node));
    node
}

fn insert_at(
    node: Option<&NodeRef>,
    key: &[u8],
    value: &[u8],
    delta: &mut Vec<NodeRef>,
) -> NodeRef {
    let Some(n) = node else {
        return fresh(delta, key.to_vec(), value.to_vec(), None, None);
    };
    match key.cmp(&n.key) {
        Ordering::Equal => fresh(
            delta,
            n.key.clone(),
            value.to_vec(),
            n.left.clone(),
            n.right.clone(),
        ),
        Ordering::Less => {
            let left = Some(insert_at(n.left.as_ref(), key, value, delta));
            fresh(delta, n.key.clone(), n.value.clone(), left, n.right.clone())
        }
        Ordering::Greater => {
            let right = Some(insert_at(n.right.as_ref(), key, value, delta));
            fresh(delta, n.key.clone(), n.value.clone(), n.left.clone(), right)
        }
    }
}

fn remove_at(
    node: Option<&NodeRef>,
    key: &[u8],
    delta: &mut Vec<NodeRef>,
) -> (Option<NodeRef>, bool) {
    let Some(n) = node else {
        return (None, false);
    };
    match key.cmp(&n.key) {
        Ordering::Less => match remove_at(n.left.as_ref(), key, delta) {
            // Untouched subtrees stay shared.
            (_, false) => (Some(Arc::clone(n)), false),
            (left, true) => (
                Some(fresh(delta, n.key.clone(), n.value.clone(), left, n.right.clone())),
                true,
            ),
        },
        Ordering::Greater => match remove_at(n.right.as_ref(), key, delta) {
            (_, false) => (Some(Arc::clone(n)), false),
            (right, true) => (
                Some(fresh(delta, n.key.clone(), n.value.clone(), n.left.clone(), right)),
                true,
            ),
        },
        Ordering::Equal => match (&n.left, &n.right) {
            (None, None) => (None, true),
            (Some(l), None) => (Some(Arc::clone(l)), true),
            (None, Some(r)) => (Some(Arc::clone(r)), true),
            (Some(l), Some(r)) => {
                // Splice the in-order successor into this node's place.
                let (succ_key, succ_value) = r.min_pair();
                let (right, _) = remove_at(Some(r), &succ_key, delta);
                (
                    Some(fresh(delta, succ_key, succ_value, Some(Arc::clone(l)), right)),
                    true,
                )
            }
        },
    }
}

fn build_balanced(pairs: &[(Vec<u8>, Vec<u8>)]) -> Option<NodeRef> {
    if pairs.is_empty() {
        return None;
    }
    let mid = pairs.len() / 2;
    Some(Arc::new(Node {
        key: pairs[mid].0.clone(),
        value: pairs[mid].1.clone(),
        left: build_balanced(&pairs[..mid]),
        right: build_balanced(&pairs[mid + 1..]),
    }))
}
