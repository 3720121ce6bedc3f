use std::sync::Arc;

use keel_tree::PersistentTree;
use keel_types::{IntentionBody, Token};

use crate::db::Database;
use crate::error::EngineResult;

/// An in-progress transaction. Reads and writes are recorded into its
/// intention while the same mutations are mirrored into its tentative tree,
/// so reads always see the transaction's own writes. `commit` consumes the
/// transaction; dropping one uncommitted abandons it.
pub struct Transaction {
    db: Arc<Database>,
    intention: IntentionBody,
    tree: PersistentTree,
}

impl Transaction {
    pub(crate) fn new(db: Arc<Database>, intention: IntentionBody, tree: PersistentTree) -> Self {
        Self {
            db,
            intention,
            tree,
        }
    }

    /// Read `key`, recording the read for conflict analysis.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.intention.record_get(key);
        self.tree.get(key).map(<[u8]>::to_vec)
    }

    /// Write `key`, visible to this transaction's own reads immediately.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.intention.record_put(key, value);
        self.tree.put(key, value);
    }

    /// Remove `key`, hidden from this transaction's own reads immediately.
    pub fn delete(&mut self, key: &[u8]) {
        self.intention.record_delete(key);
        self.tree.delete(key);
    }

    /// The transaction's correlation token.
    pub fn token(&self) -> Token {
        self.intention.token()
    }

    /// Commit the transaction. A transaction that never wrote commits
    /// trivially without touching the log; otherwise the intention is
    /// appended and the call blocks until the commit processor reaches it
    /// in log order. `Ok(false)` means rejected for conflict.
    pub fn commit(self) -> EngineResult<bool> {
        if self.tree.is_read_only() {
            return Ok(true);
        }
        self.db.complete_transaction(self.intention, self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_log::{InMemoryLog, SharedLog};

    use crate::config::EntryServiceConfig;

    fn open_db() -> Arc<Database> {
        let log = Arc::new(InMemoryLog::new());
        Database::open(log as Arc<dyn SharedLog>, EntryServiceConfig::default()).unwrap()
    }

    #[test]
    fn reads_see_own_writes() {
        let db = open_db();
        let mut txn = db.begin_transaction();

        assert_eq!(txn.get(b"k"), None);
        txn.put(b"k", b"v");
        assert_eq!(txn.get(b"k"), Some(b"v".to_vec()));
        txn.put(b"k", b"v2");
        assert_eq!(txn.get(b"k"), Some(b"v2".to_vec()));

        txn.delete(b"k");
        assert_eq!(txn.get(b"k"), None);

        db.close();
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() {
        let db = open_db();
        {
            let mut txn = db.begin_transaction();
            txn.put(b"k", b"v");
            // Dropped uncommitted.
        }
        let mut reader = db.begin_transaction();
        assert_eq!(reader.get(b"k"), None);

        db.close();
    }

    #[test]
    fn tokens_are_unique_per_transaction() {
        let db = open_db();
        let t1 = db.begin_transaction();
        let t2 = db.begin_transaction();
        assert_ne!(t1.token(), t2.token());

        db.close();
    }
}
