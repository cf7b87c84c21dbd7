//! Core error types for the vestige engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A rule bundle line could not be compiled
    #[error("invalid rule at line {line}: {reason}")]
    InvalidRule { line: usize, reason: String },

    /// The walk could not proceed past the root
    #[error("walk aborted: {0}")]
    WalkAborted(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
