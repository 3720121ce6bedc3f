use std::sync::RwLock;

use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::traits::SharedLog;

/// In-memory shared log for tests, local demos, and embedding. `reserve`
/// and `fill` let tests create the transient holes a real distributed log
/// exhibits when a slow writer holds an assigned position.
#[derive(Default)]
pub struct InMemoryLog {
    slots: RwLock<Vec<Option<Vec<u8>>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next position without writing it; reads of the slot
    /// return `NotWritten` until `fill` runs.
    pub fn reserve(&self) -> u64 {
        let mut slots = self.slots.write().expect("log lock poisoned");
        slots.push(None);
        (slots.len() - 1) as u64
    }

    /// Write a previously reserved slot.
    pub fn fill(&self, position: u64, data: &[u8]) -> LogResult<()> {
        let mut slots = self.slots.write().expect("log lock poisoned");
        match slots.get_mut(position as usize) {
            Some(slot @ None) => {
                *slot = Some(data.to_vec());
                Ok(())
            }
            Some(Some(_)) => Err(LogError::Permanent(format!(
                "position {position} is already written"
            ))),
            None => Err(LogError::Permanent(format!(
                "position {position} was never reserved"
            ))),
        }
    }

}

impl SharedLog for InMemoryLog {
    fn append(&self, data: &[u8]) -> LogResult<u64> {
        let mut slots = self.slots.write().expect("log lock poisoned");
        slots.push(Some(data.to_vec()));
        let position = (slots.len() - 1) as u64;
        debug!(position, len = data.len(), "log append");
        Ok(position)
    }

    fn read(&self, position: u64) -> LogResult<Vec<u8>> {
        let slots = self.slots.read().expect("log lock poisoned");
        match slots.get(position as usize) {
            Some(Some(data)) => Ok(data.clone()),
            _ => Err(LogError::NotWritten { position }),
        }
    }

    fn check_tail(&self) -> LogResult<u64> {
        Ok(self.slots.read().expect("log lock poisoned").len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_dense_positions() {
        let log = InMemoryLog::new();
        assert_eq!(log.append(b"a").unwrap(), 0);
        assert_eq!(log.append(b"b").unwrap(), 1);
        assert_eq!(log.append(b"c").unwrap(), 2);
        assert_eq!(log.check_tail().unwrap(), 3);
    }

    #[test]
    fn read_returns_appended_bytes() {
        let log = InMemoryLog::new();
        let pos = log.append(b"payload").unwrap();
        assert_eq!(log.read(pos).unwrap(), b"payload");
    }

    #[test]
    fn read_past_tail_is_not_written() {
        let log = InMemoryLog::new();
        assert_eq!(log.read(0).unwrap_err(), LogError::NotWritten { position: 0 });
        log.append(b"x").unwrap();
        assert_eq!(log.read(5).unwrap_err(), LogError::NotWritten { position: 5 });
    }

    #[test]
    fn reserved_slot_reads_as_hole_until_filled() {
        let log = InMemoryLog::new();
        log.append(b"before").unwrap();
        let hole = log.reserve();
        let after = log.append(b"after").unwrap();

        // The hole sits below the tail.
        assert!(hole < log.check_tail().unwrap());
        assert!(hole < after);
        assert_eq!(
            log.read(hole).unwrap_err(),
            LogError::NotWritten { position: hole }
        );

        log.fill(hole, b"late").unwrap();
        assert_eq!(log.read(hole).unwrap(), b"late");
    }

    #[test]
    fn fill_rejects_written_and_unreserved_slots() {
        let log = InMemoryLog::new();
        let pos = log.append(b"x").unwrap();
        assert!(matches!(
            log.fill(pos, b"y").unwrap_err(),
            LogError::Permanent(_)
        ));
        assert!(matches!(
            log.fill(99, b"y").unwrap_err(),
            LogError::Permanent(_)
        ));
    }

    #[test]
    fn tail_is_monotone_under_concurrent_appends() {
        use std::sync::Arc;
        use std::thread;

        let log = Arc::new(InMemoryLog::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let log = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    log.append(b"entry").unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.check_tail().unwrap(), 100);
    }
}
