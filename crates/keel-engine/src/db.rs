use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use keel_log::SharedLog;
use keel_tree::{NodeRef, PersistentTree};
use keel_types::{AfterImageBody, IntentionBody, Position, Token, TxOp};

use crate::config::EntryServiceConfig;
use crate::entry::Intention;
use crate::error::{EngineError, EngineResult};
use crate::service::EntryService;
use crate::txn::Transaction;

struct DbInner {
    /// Root of the latest committed tree version, and the position of the
    /// intention that produced it.
    root: Option<NodeRef>,
    committed_position: Position,
    /// Write-sets of committed intentions, consulted by the conflict check.
    history: BTreeMap<Position, HashSet<Vec<u8>>>,
    /// Commit decisions owed to local transactions, keyed by token.
    waiters: HashMap<Token, mpsc::Sender<bool>>,
    /// Resolved primary after-image positions, keyed by intention position.
    after_images: HashMap<Position, Position>,
}

/// A versioned key-value database sequenced through the shared log. All
/// state is derived from the log: `commit` appends a transaction's intention
/// and blocks until the commit processor, consuming the fan-out in log
/// order, decides it; committed intentions are replayed onto the latest root
/// and post-imaged back into the log. `open` expects a fresh log — recovery
/// from an existing one is a bootstrap concern outside this engine.
pub struct Database {
    service: Arc<EntryService>,
    inner: Mutex<DbInner>,
    next_token: AtomicU64,
    threads: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Database {
    /// Open a database over `log`, seeding it with a genesis intention so
    /// every transaction's snapshot names a real committed position.
    pub fn open(log: Arc<dyn SharedLog>, config: EntryServiceConfig) -> EngineResult<Arc<Self>> {
        let service = Arc::new(EntryService::new(log, config));

        let genesis = service.append_intention(IntentionBody::new(0, 0))?;
        let genesis_position = genesis.position();

        let db = Arc::new(Self {
            service: Arc::clone(&service),
            inner: Mutex::new(DbInner {
                root: None,
                committed_position: genesis_position,
                history: BTreeMap::new(),
                waiters: HashMap::new(),
                after_images: HashMap::new(),
            }),
            next_token: AtomicU64::new(1),
            threads: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        service.start(genesis_position);

        // The commit processor consumes the fan-out like any other
        // intention consumer, anchored just past genesis.
        let queue = service.new_intention_queue(genesis_position + 1);
        let processor = {
            let db = Arc::clone(&db);
            thread::Builder::new()
                .name("keel-commit".into())
                .spawn(move || {
                    while let Some(intention) = queue.wait() {
                        db.process_intention(&intention);
                    }
                })
                .expect("failed to spawn commit processor")
        };

        let tracker = {
            let db = Arc::clone(&db);
            thread::Builder::new()
                .name("keel-after-images".into())
                .spawn(move || {
                    while let Some((delta, tree)) = db.service.matcher().match_next() {
                        db.record_match(delta.len(), &tree);
                    }
                })
                .expect("failed to spawn after-image tracker")
        };

        {
            let mut threads = db.threads.lock().expect("thread list poisoned");
            threads.push(processor);
            threads.push(tracker);
        }

        info!(genesis = genesis_position, "database opened");
        Ok(db)
    }

    /// Begin a transaction reading against the latest committed version.
    pub fn begin_transaction(self: &Arc<Self>) -> Transaction {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (root, snapshot) = {
            let inner = self.inner.lock().expect("db lock poisoned");
            (inner.root.clone(), inner.committed_position)
        };
        Transaction::new(
            Arc::clone(self),
            IntentionBody::new(snapshot, token),
            PersistentTree::tentative(root, token),
        )
    }

    /// The position of the intention that produced the latest committed version.
    pub fn committed_position(&self) -> Position {
        self.inner
            .lock()
            .expect("db lock poisoned")
            .committed_position
    }

    /// The resolved primary after-image position for a committed intention.
    pub fn after_image_position(&self, intention: Position) -> Option<Position> {
        self.inner
            .lock()
            .expect("db lock poisoned")
            .after_images
            .get(&intention)
            .copied()
    }

    /// Stop the entry service and both database threads. Idempotent.
    /// Outstanding commits fail with [`EngineError::DecisionLost`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.service.stop();

        let threads: Vec<_> = {
            let mut threads = self.threads.lock().expect("thread list poisoned");
            threads.drain(..).collect()
        };
        for handle in threads {
            let _ = handle.join();
        }

        // Fail any transaction still waiting on a decision.
        self.inner.lock().expect("db lock poisoned").waiters.clear();
        info!("database closed");
    }

    /// Append the intention, register its tree with the matcher, and block
    /// until the commit processor reaches it in log order.
    pub(crate) fn complete_transaction(
        &self,
        body: IntentionBody,
        mut tree: PersistentTree,
    ) -> EngineResult<bool> {
        let token = body.token();
        let (sender, receiver) = mpsc::channel();

        // Register the waiter first: the processor may reach the intention
        // before this thread returns from the append. Re-check closed after
        // registering so a concurrent close cannot orphan the waiter.
        {
            let mut inner = self.inner.lock().expect("db lock poisoned");
            inner.waiters.insert(token, sender);
        }
        if self.closed.load(Ordering::SeqCst) {
            let mut inner = self.inner.lock().expect("db lock poisoned");
            inner.waiters.remove(&token);
            return Err(EngineError::DecisionLost);
        }

        let intention = match self.service.append_intention(body) {
            Ok(intention) => intention,
            Err(err) => {
                let mut inner = self.inner.lock().expect("db lock poisoned");
                inner.waiters.remove(&token);
                return Err(err);
            }
        };
        tree.promote(intention.position());

        let decision = receiver.recv().map_err(|_| EngineError::DecisionLost)?;

        // Only a committed tree enters the rendezvous; an aborted intention
        // never gets an after-image, and its slot would stall the watermark.
        if decision {
            let delta = tree.take_delta();
            self.service.matcher().watch(delta, tree);
        }
        Ok(decision)
    }

    /// Decide one intention in log order: validate it against the
    /// intentions that committed inside its snapshot window; on success,
    /// replay it onto the committed root and post-image the result.
    fn process_intention(&self, intention: &Intention) {
        let position = intention.position();

        let image = {
            let mut inner = self.inner.lock().expect("db lock poisoned");

            let touched = intention.body().touched_set();
            let window = (
                Bound::Excluded(intention.snapshot()),
                Bound::Excluded(position),
            );
            let conflicted = inner
                .history
                .range(window)
                .any(|(_, writes)| writes.iter().any(|key| touched.contains(key)));

            if conflicted {
                debug!(intention = position, "transaction aborted on conflict");
                None
            } else {
                let mut tree = PersistentTree::tentative(inner.root.clone(), intention.token());
                for op in intention.ops() {
                    match op {
                        TxOp::Put { key, value } => tree.put(key, value),
                        TxOp::Delete { key } => {
                            tree.delete(key);
                        }
                        TxOp::Get { .. } => {}
                    }
                }
                tree.promote(position);
                let serialized = match tree.serialize() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(intention = position, %err, "tree serialization failed");
                        panic!("tree serialization failed for intention {position}: {err}");
                    }
                };
                inner.root = tree.root().cloned();
                inner.committed_position = position;
                inner.history.insert(position, intention.body().write_set());
                Some(serialized)
            }
        };

        // The log append happens outside the database lock.
        let decision = match image {
            Some(serialized) => {
                match self
                    .service
                    .append_after_image(AfterImageBody::new(position, serialized))
                {
                    Ok(after_image) => {
                        debug!(intention = position, after_image, "transaction committed");
                        true
                    }
                    Err(err) => {
                        error!(intention = position, %err, "after-image append failed");
                        panic!("after-image append failed for intention {position}: {err}");
                    }
                }
            }
            None => false,
        };

        let waiter = {
            let mut inner = self.inner.lock().expect("db lock poisoned");
            inner.waiters.remove(&intention.token())
        };
        if let Some(sender) = waiter {
            // A departed waiter is fine; the decision stands either way.
            let _ = sender.send(decision);
        }
    }

    /// Record one matched pair from the after-image rendezvous.
    fn record_match(&self, delta_len: usize, tree: &PersistentTree) {
        let intention = tree.intention_position();
        let after_image = tree
            .after_image_position()
            .expect("matched tree carries its after-image position");
        self.inner
            .lock()
            .expect("db lock poisoned")
            .after_images
            .insert(intention, after_image);
        debug!(
            intention,
            after_image,
            nodes = delta_len,
            "primary after-image resolved"
        );
    }
}
