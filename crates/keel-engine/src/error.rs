use keel_log::LogError;
use keel_tree::TreeError;
use keel_wire::WireError;

/// Errors surfaced by engine operations: boundary failures propagated from
/// collaborator crates, or lifecycle errors of the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// The commit processor went away before delivering a decision.
    #[error("commit decision channel closed before a decision arrived")]
    DecisionLost,
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
