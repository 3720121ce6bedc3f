/// Errors produced by tree serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Convenience alias used throughout the tree crate.
pub type TreeResult<T> = std::result::Result<T, TreeError>;
