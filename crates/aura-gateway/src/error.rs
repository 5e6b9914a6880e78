//! Error types for aura-gateway

use std::fmt;

/// Errors raised while handling a CLI command
#[derive(Debug)]
pub enum GatewayError {
    /// Core error
    Core(aura_core::Error),
    /// Bad command usage
    Usage(String),
    /// Reading a tool definition file failed
    Io(std::io::Error),
    /// Tool definition is not valid JSON
    Json(serde_json::Error),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(e) => write!(f, "{}", e),
            Self::Usage(e) => write!(f, "Usage: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Json(e) => write!(f, "Invalid tool definition: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<aura_core::Error> for GatewayError {
    fn from(e: aura_core::Error) -> Self {
        Self::Core(e)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Result type alias for command handlers
pub type Result<T> = std::result::Result<T, GatewayError>;
