//! Error types for aura-core

use thiserror::Error;

/// Main error type for aura-core
///
/// Errors local to one tool dispatch (`ParameterExtraction`,
/// `UnsupportedHttpMethod`, `ExternalApi`, `ToolNotFound`) are turned into
/// tool-result messages by the router. The rest abort the turn.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Oracle transport error: {0}")]
    OracleTransport(String),

    #[error("Parameter extraction failed: {0}")]
    ParameterExtraction(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedHttpMethod(String),

    #[error("External API returned {status}: {body}")]
    ExternalApi { status: u16, body: String },

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Loop bound of {0} cycles exceeded")]
    LoopBoundExceeded(usize),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid tool configuration: {0}")]
    InvalidToolConfig(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller may retry the failed operation as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OracleTransport(_) | Self::Persistence(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// Result type alias for aura-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::OracleTransport("timeout".into()).is_retryable());
        assert!(Error::Persistence("locked".into()).is_retryable());
        assert!(!Error::ToolNotFound("ask_ghost_agent".into()).is_retryable());
        assert!(!Error::ExternalApi { status: 500, body: "boom".into() }.is_retryable());
    }

    #[test]
    fn test_database_error_is_persistence() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_external_api_display() {
        let err = Error::ExternalApi { status: 404, body: "not found".into() };
        assert_eq!(err.to_string(), "External API returned 404: not found");
    }
}
