use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::op::TxOp;
use crate::{Position, Token};

/// A proposed transaction as it is appended to the shared log: the snapshot
/// it read against, the client's correlation token, and its ordered ops.
/// The position the log assigns at append time is not part of the body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentionBody {
    snapshot: Position,
    token: Token,
    ops: Vec<TxOp>,
}

impl IntentionBody {
    /// Create an empty intention reading against `snapshot`.
    pub fn new(snapshot: Position, token: Token) -> Self {
        Self {
            snapshot,
            token,
            ops: Vec::new(),
        }
    }

    /// The position of the committed intention this transaction read against.
    pub fn snapshot(&self) -> Position {
        self.snapshot
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// The recorded operations, in execution order.
    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    /// Record a point read of `key`.
    pub fn record_get(&mut self, key: &[u8]) {
        self.ops.push(TxOp::Get { key: key.to_vec() });
    }

    /// Record an upsert of `key` to `value`.
    pub fn record_put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(TxOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Record a removal of `key`.
    pub fn record_delete(&mut self, key: &[u8]) {
        self.ops.push(TxOp::Delete { key: key.to_vec() });
    }

    /// Returns `true` if the intention carries no mutations.
    pub fn is_read_only(&self) -> bool {
        !self.ops.iter().any(TxOp::is_write)
    }

    /// The set of keys this intention wrote (put or delete).
    pub fn write_set(&self) -> HashSet<Vec<u8>> {
        self.ops
            .iter()
            .filter(|op| op.is_write())
            .map(|op| op.key().to_vec())
            .collect()
    }

    /// The set of all keys this intention touched, reads included.
    pub fn touched_set(&self) -> HashSet<Vec<u8>> {
        self.ops.iter().map(|op| op.key().to_vec()).collect()
    }
}
