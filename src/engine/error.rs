//! Engine error types

use thiserror::Error;

/// Errors raised by format parsers
#[derive(Debug, Error)]
pub enum EngineError {
    /// File content does not match its detected format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Metadata removal failed part way through
    #[error("Clean error: {0}")]
    CleanError(String),

    /// Archive member the engine cannot classify, under the abort policy
    #[error("unknown member {0} (use the keep or omit policy to proceed)")]
    UnknownMember(String),

    /// A sandbox or nesting ceiling was hit
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        EngineError::ParseError(err.to_string())
    }
}

impl From<zip::result::ZipError> for EngineError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => EngineError::IoError(e),
            other => EngineError::ParseError(other.to_string()),
        }
    }
}
