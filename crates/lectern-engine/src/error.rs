//! Error types for the engine

use crate::report::Stage;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a generation run was aborted without producing an outline
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The caller cancelled the run
    Cancelled,

    /// Every capability call of a stage failed
    StageFailed {
        /// Stage that produced nothing usable
        stage: Stage,
        /// Number of calls attempted in the stage
        attempted: usize,
    },

    /// Too many capability calls failed across the run
    FailureRatioExceeded {
        /// Failed calls so far
        failed: usize,
        /// Attempted calls so far
        attempted: usize,
        /// Configured ceiling
        max_ratio: f64,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled by caller"),
            AbortReason::StageFailed { stage, attempted } => {
                write!(f, "all {} {} calls failed", attempted, stage)
            }
            AbortReason::FailureRatioExceeded {
                failed,
                attempted,
                max_ratio,
            } => write!(
                f,
                "{} of {} calls failed (max ratio {:.2})",
                failed, attempted, max_ratio
            ),
        }
    }
}

/// Errors that can occur during generation
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration or a context size too small for a call site
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request rejected before any work started
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Generation aborted; no outline is returned
    #[error("Generation aborted: {0}")]
    Aborted(AbortReason),

    /// A capability call failed
    #[error("Capability error: {0}")]
    Capability(String),

    /// A capability call exceeded the per-call timeout
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed capability output
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl EngineError {
    /// Shorthand for a cancelled run
    pub fn cancelled() -> Self {
        EngineError::Aborted(AbortReason::Cancelled)
    }

    /// Whether the error aborted the whole run
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::JsonParse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_messages() {
        let err = EngineError::Aborted(AbortReason::StageFailed {
            stage: Stage::OutlineMerge,
            attempted: 3,
        });
        assert_eq!(
            err.to_string(),
            "Generation aborted: all 3 outline merge calls failed"
        );
        assert!(err.is_abort());
        assert!(!EngineError::Timeout(Duration::from_secs(1)).is_abort());
    }

    #[test]
    fn test_from_json_error() {
        let err: EngineError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EngineError::JsonParse(_)));
    }
}
