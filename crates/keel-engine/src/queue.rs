use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use keel_types::Position;

use crate::entry::Intention;

struct QueueInner {
    items: VecDeque<Arc<Intention>>,
    next_position: Position,
    stopped: bool,
}

/// A position-anchored FIFO of intentions for one consumer. The queue's
/// position is the next log position the consumer wants; it is monotonically
/// non-decreasing over the queue's lifetime.
pub struct IntentionQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl IntentionQueue {
    /// A queue whose consumer wants entries starting at `position`.
    pub fn new(position: Position) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                next_position: position,
                stopped: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Enqueue an intention and advance the queue position past it. A push
    /// positioned before the cursor breaks the ordering contract and panics.
    pub fn push(&self, intention: Arc<Intention>) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        assert!(
            inner.next_position <= intention.position(),
            "intention queue pushed backwards: at {} got {}",
            inner.next_position,
            intention.position()
        );
        inner.next_position = intention.position() + 1;
        inner.items.push_back(intention);
        drop(inner);
        self.cond.notify_one();
    }

    /// Block until an intention is available; `None` once stopped.
    pub fn wait(&self) -> Option<Arc<Intention>> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        loop {
            if inner.stopped {
                return None;
            }
            if let Some(intention) = inner.items.pop_front() {
                return Some(intention);
            }
            inner = self.cond.wait(inner).expect("queue lock poisoned");
        }
    }

    /// The next log position this queue wants to receive.
    pub fn position(&self) -> Position {
        self.inner.lock().expect("queue lock poisoned").next_position
    }

    /// Wake all waiters with the stop sentinel.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.stopped = true;
        drop(inner);
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use keel_types::IntentionBody;

    fn intention(position: Position) -> Arc<Intention> {
        Arc::new(Intention::new(IntentionBody::new(0, position), position))
    }

    #[test]
    fn delivers_in_push_order_and_advances_position() {
        let queue = IntentionQueue::new(0);
        assert_eq!(queue.position(), 0);

        queue.push(intention(0));
        queue.push(intention(1));
        assert_eq!(queue.position(), 2);

        assert_eq!(queue.wait().unwrap().position(), 0);
        assert_eq!(queue.wait().unwrap().position(), 1);
    }

    #[test]
    fn position_skips_follow_pushed_intentions() {
        let queue = IntentionQueue::new(3);
        queue.push(intention(7));
        assert_eq!(queue.position(), 8);
    }

    #[test]
    #[should_panic(expected = "pushed backwards")]
    fn backwards_push_panics() {
        let queue = IntentionQueue::new(5);
        queue.push(intention(3));
    }

    #[test]
    fn wait_blocks_until_push() {
        let queue = Arc::new(IntentionQueue::new(0));
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let got = queue.wait();
                tx.send(got.map(|i| i.position())).unwrap();
            })
        };

        // Nothing delivered yet.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        queue.push(intention(4));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(4)
        );
        waiter.join().unwrap();
    }

    #[test]
    fn stop_wakes_all_waiters_with_sentinel() {
        let queue = Arc::new(IntentionQueue::new(0));
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            waiters.push(thread::spawn(move || queue.wait()));
        }

        queue.stop();
        for w in waiters {
            assert!(w.join().unwrap().is_none());
        }
    }

    #[test]
    fn stopped_queue_returns_sentinel_even_with_items() {
        let queue = IntentionQueue::new(0);
        queue.push(intention(0));
        queue.stop();
        assert!(queue.wait().is_none());
    }
}
