/// Errors produced by shared-log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// The slot exists below the tail but carries no data yet. Transient:
    /// callers retry at the same position.
    #[error("position {position} is not yet written")]
    NotWritten { position: u64 },

    /// The backend reports an unrecoverable read or append failure.
    #[error("permanent log failure: {0}")]
    Permanent(String),
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = std::result::Result<T, LogError>;
