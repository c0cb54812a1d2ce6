use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure an adapter call can surface to its caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Bad input. Never sent over the wire.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No response was obtained from the provider.
    #[error("Transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// The provider answered with a non-2xx status.
    #[error("Provider error ({status_code}): {raw_body}")]
    Provider { status_code: u16, raw_body: String },

    /// A 2xx body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The stream ended without the provider's completion signal.
    #[error("Stream ended before completion after {} bytes of content", partial.len())]
    IncompleteStream { partial: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl AdapterError {
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AdapterError::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Transport { timeout: true, .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            AdapterError::Provider { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        let timeout = err.is_timeout();
        // urls can carry a query-string api key
        AdapterError::Transport {
            message: err.without_url().to_string(),
            timeout,
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        AdapterError::Transport {
            message: err.to_string(),
            timeout: err.kind() == std::io::ErrorKind::TimedOut,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Failure of a single tool call. Sibling calls are unaffected.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolExecutionError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolExecutionError>;
