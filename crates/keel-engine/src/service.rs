use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use keel_log::{LogError, SharedLog};
use keel_types::{AfterImageBody, IntentionBody, Position};
use keel_wire::{EntryCodec, LogEntry};

use crate::cache::{CacheEntry, EntryCache};
use crate::config::EntryServiceConfig;
use crate::entry::{AfterImage, Intention};
use crate::error::EngineResult;
use crate::matcher::PrimaryAfterImageMatcher;
use crate::queue::IntentionQueue;

struct ServiceState {
    queues: Vec<Arc<IntentionQueue>>,
    stop: bool,
}

/// Structural failures (corrupt entries, permanent log errors) must not be
/// survived.
fn fatal(what: &str, position: Position, err: &dyn std::fmt::Display) -> ! {
    error!(position, %err, "{what}");
    panic!("{what} at position {position}: {err}");
}

fn spawn_loop(name: &str, body: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .expect("failed to spawn service loop")
}

/// Background reader of the shared log, running two loops over one cache:
/// the IO loop scans every position in log order, classifying entries and
/// feeding after-images to the matcher in ascending order (what makes
/// "first after-image following an intention" well-defined); the intention
/// loop independently walks the positions the registered queues want.
pub struct EntryService {
    log: Arc<dyn SharedLog>,
    config: EntryServiceConfig,
    cache: EntryCache,
    matcher: PrimaryAfterImageMatcher,
    state: Mutex<ServiceState>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl EntryService {
    pub fn new(log: Arc<dyn SharedLog>, config: EntryServiceConfig) -> Self {
        let cache = EntryCache::new(config.intention_cache_cap);
        Self {
            log,
            config,
            cache,
            matcher: PrimaryAfterImageMatcher::new(),
            state: Mutex::new(ServiceState {
                queues: Vec::new(),
                stop: false,
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Spawn both reader loops, scanning from `position`.
    pub fn start(self: &Arc<Self>, position: Position) {
        let mut threads = self.threads.lock().expect("thread list poisoned");
        assert!(threads.is_empty(), "entry service already started");

        let service = Arc::clone(self);
        threads.push(spawn_loop("keel-io", move || service.io_loop(position)));
        let service = Arc::clone(self);
        threads.push(spawn_loop("keel-intentions", move || service.intention_loop()));
        info!(start = position, "entry service started");
    }

    /// Stop both loops, shut down the matcher, and stop every queue.
    /// Idempotent; blocks until the loops have exited.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().expect("service lock poisoned");
            if state.stop {
                return;
            }
            state.stop = true;
        }
        self.matcher.shutdown();

        let queues = self.state.lock().expect("service lock poisoned").queues.clone();
        for queue in queues {
            queue.stop();
        }
        let threads: Vec<_> = {
            let mut threads = self.threads.lock().expect("thread list poisoned");
            threads.drain(..).collect()
        };
        for handle in threads {
            let _ = handle.join();
        }
        info!("entry service stopped");
    }

    /// Register a consumer queue wanting intentions from `position` onward.
    /// Registering below the current minimum rewinds the intention loop;
    /// queues already past it receive no duplicates.
    pub fn new_intention_queue(&self, position: Position) -> Arc<IntentionQueue> {
        let queue = Arc::new(IntentionQueue::new(position));
        let mut state = self.state.lock().expect("service lock poisoned");
        if state.stop {
            queue.stop();
        }
        state.queues.push(Arc::clone(&queue));
        queue
    }

    /// The after-image rendezvous fed by the IO loop.
    pub fn matcher(&self) -> &PrimaryAfterImageMatcher {
        &self.matcher
    }

    /// Encode and append an intention. On success the returned intention is
    /// stamped with its assigned position and pre-published into the cache
    /// so the intention loop can deliver it without re-reading the log.
    pub fn append_intention(&self, body: IntentionBody) -> EngineResult<Arc<Intention>> {
        let blob = EntryCodec::encode(&LogEntry::Intention(body.clone()))?;
        let position = self.log.append(&blob)?;
        let intention = Arc::new(Intention::new(body, position));
        let published = self
            .cache
            .publish(position, CacheEntry::Intention(Arc::clone(&intention)));
        debug!(position, "intention appended");
        Ok(published.as_intention().unwrap_or(intention))
    }

    /// Encode and append an after-image, returning its assigned position.
    pub fn append_after_image(&self, body: AfterImageBody) -> EngineResult<Position> {
        let blob = EntryCodec::encode(&LogEntry::AfterImage(body))?;
        let position = self.log.append(&blob)?;
        debug!(position, "after-image appended");
        Ok(position)
    }

    /// Resolve a batch of positions to shared intention refs, in request
    /// order. Misses are read outside the cache lock and pinned; publisher-
    /// wins converges concurrent callers on one ref per position. A position
    /// holding an after-image is a contract violation and panics.
    pub fn read_intentions(&self, positions: &[Position]) -> EngineResult<Vec<Arc<Intention>>> {
        let mut out = Vec::with_capacity(positions.len());
        for &position in positions {
            let intention = match self.cache.pin(position) {
                Some(entry) => entry.as_intention(),
                None => {
                    let data = self.log.read(position)?;
                    match EntryCodec::decode(&data)? {
                        LogEntry::Intention(body) => {
                            let fresh = Arc::new(Intention::new(body, position));
                            self.cache
                                .insert(position, CacheEntry::Intention(fresh))
                                .as_intention()
                        }
                        LogEntry::AfterImage(_) => None,
                    }
                }
            };
            let intention = intention
                .unwrap_or_else(|| panic!("position {position} is not an intention"));
            out.push(intention);
        }
        Ok(out)
    }

    fn stopping(&self) -> bool {
        self.state.lock().expect("service lock poisoned").stop
    }

    /// Scan the log in ascending order, classify entries, and feed the
    /// matcher. Holes are retried in place; the multi-node fill policy
    /// belongs to the log, not here.
    fn io_loop(&self, start: Position) {
        let mut next = start;
        let mut idle = self.config.tail_poll_interval;
        loop {
            if self.stopping() {
                break;
            }
            let tail = match self.log.check_tail() {
                Ok(tail) => tail,
                Err(err) => fatal("tail check failed", next, &err),
            };
            if next >= tail {
                thread::sleep(idle);
                idle = (idle * 2).min(self.config.tail_poll_ceiling);
                continue;
            }
            idle = self.config.tail_poll_interval;

            while next < tail {
                if self.stopping() {
                    return;
                }
                // Already observed, or pre-published by an append. Only this
                // loop inserts after-images, so a hit for an unvisited
                // position is always an intention.
                if self.cache.pin(next).is_some() {
                    next += 1;
                    continue;
                }
                let data = match self.log.read(next) {
                    Ok(data) => data,
                    Err(LogError::NotWritten { .. }) => continue,
                    Err(err) => fatal("log read failed", next, &err),
                };
                match EntryCodec::decode(&data) {
                    Ok(LogEntry::Intention(body)) => {
                        let intention = Arc::new(Intention::new(body, next));
                        self.cache.insert(next, CacheEntry::Intention(intention));
                    }
                    Ok(LogEntry::AfterImage(body)) => {
                        assert!(
                            body.is_well_formed(next),
                            "after-image at {next} references intention {} ahead of it",
                            body.intention_ref()
                        );
                        let image = Arc::new(AfterImage::new(body, next));
                        self.cache
                            .insert(next, CacheEntry::AfterImage(Arc::clone(&image)));
                        self.matcher.push(image.intention_ref(), next);
                    }
                    Err(err) => fatal("entry decode failed", next, &err),
                }
                next += 1;
            }
        }
    }

    /// Deliver intentions to every registered queue in log order, from the
    /// minimum position any queue wants.
    fn intention_loop(&self) {
        // Cursor plus the minimum observed when it last moved. A drop in the
        // minimum means a new queue rewound the fan-out; the cursor restarts
        // at the new minimum.
        let mut cursor: Option<(Position, Position)> = None;
        loop {
            // Snapshot the queue set with its minimum: a queue registered
            // after this point joins on a later round, where a lowered
            // minimum reads as a rewind.
            let (queues, min_pos) = {
                let state = self.state.lock().expect("service lock poisoned");
                if state.stop {
                    return;
                }
                let min = state.queues.iter().map(|q| q.position()).min();
                (state.queues.clone(), min)
            };
            let Some(min_pos) = min_pos else {
                cursor = None;
                thread::sleep(self.config.tail_poll_interval);
                continue;
            };

            let pos = match cursor {
                None => min_pos,
                Some((prev_min, _)) if min_pos < prev_min => min_pos,
                Some((_, pos)) => pos,
            };
            cursor = Some((min_pos, pos));

            let intention = match self.cache.pin(pos) {
                Some(entry) => entry.as_intention(),
                None => match self.log.read(pos) {
                    Err(LogError::NotWritten { .. }) => {
                        thread::sleep(self.config.tail_poll_interval);
                        continue;
                    }
                    Err(err) => fatal("log read failed", pos, &err),
                    Ok(data) => match EntryCodec::decode(&data) {
                        Ok(LogEntry::Intention(body)) => {
                            let fresh = Arc::new(Intention::new(body, pos));
                            self.cache
                                .insert(pos, CacheEntry::Intention(fresh))
                                .as_intention()
                        }
                        Ok(LogEntry::AfterImage(_)) => None,
                        Err(err) => fatal("entry decode failed", pos, &err),
                    },
                },
            };

            if let Some(intention) = intention {
                for queue in &queues {
                    if queue.position() <= pos {
                        queue.push(Arc::clone(&intention));
                    }
                }
            }
            cursor = Some((min_pos, pos + 1));
        }
    }
}
