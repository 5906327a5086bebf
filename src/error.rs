//! Error types for the queue engine.
//!
//! Only [`EngineError::IndexOutOfRange`] and [`EngineError::NothingPlaying`]
//! ever reach a caller of a queue operation. The remaining kinds describe
//! conditions the engine recovers from on its own; they exist so the recovery
//! paths can log a typed reason.

use thiserror::Error;

/// Failures and recoverable conditions raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Extension or shuffle attempted with nothing eligible.
    #[error("no eligible candidates")]
    EmptyCandidatePool,

    /// Persisted shuffle or queue state could not be decoded.
    #[error("malformed persisted state: {0}")]
    MalformedPersistedState(String),

    /// Every remaining candidate weighed zero or less.
    #[error("all candidate weights collapsed to zero")]
    DegenerateWeights,

    #[error("index {index} out of range for queue of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no item is currently playing")]
    NothingPlaying,
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_message_names_bounds() {
        let err = EngineError::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "index 7 out of range for queue of length 3");
    }

    #[test]
    fn test_recoverable_kinds_have_log_messages() {
        assert_eq!(EngineError::EmptyCandidatePool.to_string(), "no eligible candidates");
        assert_eq!(
            EngineError::MalformedPersistedState("bad json".into()).to_string(),
            "malformed persisted state: bad json"
        );
    }
}
