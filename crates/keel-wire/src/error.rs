/// Errors produced while framing or parsing shared-log entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The frame is truncated or its length prefix disagrees with the data.
    #[error("framing error: {0}")]
    Framing(String),

    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// The type tag is the reserved unset value or unknown: corruption or a
    /// misbehaving log writer.
    #[error("malformed entry: unusable type tag {tag}")]
    MalformedEntry { tag: u8 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Convenience alias used throughout the wire crate.
pub type WireResult<T> = std::result::Result<T, WireError>;
