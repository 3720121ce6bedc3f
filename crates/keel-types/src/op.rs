use serde::{Deserialize, Serialize};

/// A single recorded transaction operation. Reads are recorded alongside
/// writes so conflict analysis can validate a transaction's read set
/// against intentions that committed after its snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOp {
    /// A point read of `key`.
    Get { key: Vec<u8> },
    /// An upsert of `key` to `value`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// A removal of `key`.
    Delete { key: Vec<u8> },
}

impl TxOp {
    /// The key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Get { key } | Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Returns `true` if this operation mutates state.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Put { .. } | Self::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_accessor_covers_all_variants() {
        let get = TxOp::Get { key: b"a".to_vec() };
        let put = TxOp::Put {
            key: b"b".to_vec(),
            value: b"v".to_vec(),
        };
        let del = TxOp::Delete { key: b"c".to_vec() };

        assert_eq!(get.key(), b"a");
        assert_eq!(put.key(), b"b");
        assert_eq!(del.key(), b"c");
    }

    #[test]
    fn only_put_and_delete_are_writes() {
        assert!(!TxOp::Get { key: vec![] }.is_write());
        assert!(TxOp::Put {
            key: vec![],
            value: vec![]
        }
        .is_write());
        assert!(TxOp::Delete { key: vec![] }.is_write());
    }
}
