//! Engine-wide error type.
//!
//! Parsing failures are recoverable and only cost the offending command;
//! device failures abort the current search but never the protocol loop.

use std::time::Duration;

use thiserror::Error;

/// Represents all error kinds the engine reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The position string could not be parsed.
    #[error("malformed position: {0}")]
    MalformedPosition(String),
    /// The move text is not in coordinate notation.
    #[error("malformed move text: {0}")]
    MalformedMoveText(String),
    /// A protocol command carried an unusable argument.
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    /// The move does not fit the current position (empty origin, wrong side, ...).
    #[error("illegal move: {0}")]
    IllegalMove(String),
    /// A move or search was requested before any position was set up.
    #[error("no position has been set up")]
    NoPosition,
    /// Context creation, kernel program build or buffer allocation failed.
    #[error("device initialization failed: {0}")]
    DeviceInitFailure(String),
    /// Kernel invocation, upload or readback failed.
    #[error("kernel dispatch failed: {0}")]
    DispatchFailure(String),
    /// The kernel did not complete within the configured bound.
    #[error("search timed out after {0:?}")]
    SearchTimedOut(Duration),
}

impl EngineError {
    /// Short reason token used in `Error (<reason>): <command>` protocol replies.
    pub fn protocol_reason(&self) -> &'static str {
        match self {
            EngineError::MalformedPosition(_) => "malformed position",
            EngineError::MalformedMoveText(_) => "malformed move",
            EngineError::MalformedCommand(_) => "bad argument",
            EngineError::IllegalMove(_) => "illegal move",
            EngineError::NoPosition => "no position",
            EngineError::DeviceInitFailure(_)
            | EngineError::DispatchFailure(_)
            | EngineError::SearchTimedOut(_) => "search failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_failures_share_the_search_failed_reason() {
        let errors = [
            EngineError::DeviceInitFailure("no adapter".to_owned()),
            EngineError::DispatchFailure("lost device".to_owned()),
            EngineError::SearchTimedOut(Duration::from_millis(5)),
        ];
        for err in errors {
            assert_eq!(err.protocol_reason(), "search failed");
        }
    }

    #[test]
    fn parse_failures_keep_their_own_reason() {
        let err = EngineError::MalformedMoveText("e9e4".to_owned());
        assert_eq!(err.protocol_reason(), "malformed move");
        assert_eq!(err.to_string(), "malformed move text: e9e4");
    }
}
