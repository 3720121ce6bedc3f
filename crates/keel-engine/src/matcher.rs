use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex};

use tracing::debug;

use keel_tree::{NodeRef, PersistentTree};
use keel_types::Position;

/// A matched local tree plus the nodes its transaction created.
pub type MatchedPair = (Vec<NodeRef>, PersistentTree);

/// One rendezvous slot, keyed by intention position. Whichever side arrives
/// first parks here; `Done` is an ephemeral marker consumed by the GC.
enum Slot {
    AwaitingLocal { after_image_position: Position },
    AwaitingRemote { delta: Vec<NodeRef>, tree: PersistentTree },
    Done,
}

struct MatcherInner {
    slots: BTreeMap<Position, Slot>,
    matched: VecDeque<MatchedPair>,
    watermark: Option<Position>,
    shutdown: bool,
}

/// Pairs every committed local tree with the primary (first-following)
/// after-image of its intention. The IO loop is the sole source of `push`
/// events and scans ascending, so the first `push` for an intention ref is
/// the primary image by construction; the matched watermark rejects later
/// duplicates without retaining the key set forever.
pub struct PrimaryAfterImageMatcher {
    inner: Mutex<MatcherInner>,
    cond: Condvar,
}

impl Default for PrimaryAfterImageMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryAfterImageMatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MatcherInner {
                slots: BTreeMap::new(),
                matched: VecDeque::new(),
                watermark: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Local side: register a committed tree awaiting its after-image.
    /// Two `watch` calls for one intention is a caller bug and panics.
    pub fn watch(&self, delta: Vec<NodeRef>, mut tree: PersistentTree) {
        let intention = tree.intention_position();
        let mut inner = self.inner.lock().expect("matcher lock poisoned");

        match inner.slots.remove(&intention) {
            None => {
                inner
                    .slots
                    .insert(intention, Slot::AwaitingRemote { delta, tree });
            }
            Some(Slot::AwaitingLocal {
                after_image_position,
            }) => {
                tree.set_after_image_position(after_image_position);
                inner.slots.insert(intention, Slot::Done);
                inner.matched.push_back((delta, tree));
                self.cond.notify_one();
                debug!(intention, after_image = after_image_position, "after-image matched");
            }
            Some(_) => panic!("duplicate watch for intention {intention}"),
        }

        Self::gc(&mut inner);
    }

    /// Remote side: record an observed after-image referencing `intention`.
    /// Calls arrive in ascending `after_image_position` order; the first
    /// call for an intention wins and later ones are ignored.
    pub fn push(&self, intention: Position, after_image_position: Position) {
        let mut inner = self.inner.lock().expect("matcher lock poisoned");

        if inner.watermark.is_some_and(|w| intention <= w) {
            debug!(
                intention,
                after_image = after_image_position,
                "dropping after-image below matched watermark"
            );
            return;
        }

        match inner.slots.remove(&intention) {
            None => {
                inner.slots.insert(
                    intention,
                    Slot::AwaitingLocal {
                        after_image_position,
                    },
                );
            }
            Some(Slot::AwaitingRemote { delta, mut tree }) => {
                tree.set_after_image_position(after_image_position);
                inner.slots.insert(intention, Slot::Done);
                inner.matched.push_back((delta, tree));
                self.cond.notify_one();
                debug!(intention, after_image = after_image_position, "after-image matched");
            }
            // First occurrence wins; put the slot back untouched.
            Some(occupied) => {
                inner.slots.insert(intention, occupied);
            }
        }

        Self::gc(&mut inner);
    }

    /// Block until a matched pair is ready; `None` once shut down. Pairs
    /// come out in the order their second side arrived.
    pub fn match_next(&self) -> Option<MatchedPair> {
        let mut inner = self.inner.lock().expect("matcher lock poisoned");
        loop {
            if inner.shutdown {
                return None;
            }
            if let Some(pair) = inner.matched.pop_front() {
                return Some(pair);
            }
            inner = self.cond.wait(inner).expect("matcher lock poisoned");
        }
    }

    /// Wake all `match_next` waiters with the shutdown sentinel.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("matcher lock poisoned");
        inner.shutdown = true;
        drop(inner);
        self.cond.notify_all();
    }

    /// Position at or below which every intention has been matched.
    pub fn matched_watermark(&self) -> Option<Position> {
        self.inner.lock().expect("matcher lock poisoned").watermark
    }

    /// Number of live (unmatched) slots.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().expect("matcher lock poisoned");
        inner
            .slots
            .values()
            .filter(|s| !matches!(s, Slot::Done))
            .count()
    }

    /// Advance the watermark over the contiguous prefix of completed slots.
    /// Stops at the first live slot so the watermark never passes an
    /// unmatched intention.
    fn gc(inner: &mut MatcherInner) {
        while let Some((&intention, slot)) = inner.slots.first_key_value() {
            if !matches!(slot, Slot::Done) {
                break;
            }
            inner.slots.pop_first();
            inner.watermark = Some(intention);
            debug!(watermark = intention, "matched watermark advanced");
        }
    }
}
