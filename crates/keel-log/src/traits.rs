use crate::error::LogResult;

/// Append-only shared log with random-access reads.
///
/// All implementations must satisfy these invariants:
/// - `append` atomically assigns the next free position and never reorders
///   appends issued by the same caller.
/// - Written slots are immutable: repeated reads of a position return the
///   same bytes. An unwritten slot below the tail reads as `NotWritten`
///   until its writer lands; the consumer never writes fill entries.
/// - `check_tail` is a monotonically non-decreasing hint for the highest
///   assigned position + 1.
pub trait SharedLog: Send + Sync {
    /// Append a blob, returning the position the log assigned to it.
    fn append(&self, data: &[u8]) -> LogResult<u64>;

    /// Read the blob at `position`; `NotWritten` for unwritten slots and
    /// positions at or beyond the tail.
    fn read(&self, position: u64) -> LogResult<Vec<u8>>;

    /// The highest assigned position + 1.
    fn check_tail(&self) -> LogResult<u64>;
}
