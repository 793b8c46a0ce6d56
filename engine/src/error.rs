use thiserror::Error;

/// Failure classes reported by the analysis engine.
///
/// Every engine call fails in exactly one of these ways. The message is the
/// engine's own description and is carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine rejected its arguments.
    #[error("engine: invalid input: {0}")]
    InvalidInput(String),

    /// The engine ran but could not produce a result.
    #[error("engine: computation failed: {0}")]
    ComputationFailed(String),

    /// The engine could not allocate working memory.
    #[error("engine: allocation failed: {0}")]
    AllocationFailed(String),
}

impl EngineError {
    /// Returns the engine's message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            EngineError::InvalidInput(m)
            | EngineError::ComputationFailed(m)
            | EngineError::AllocationFailed(m) => m,
        }
    }
}
