//! Error types for the Opinion Room session engine

use crate::types::SessionStatus;
use thiserror::Error;

/// Result type alias for session engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session engine
#[derive(Debug, Error)]
pub enum Error {
    /// The backend answered with a non-success status
    #[error("Backend error: {status}: {body}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Response body text, if any
        body: String,
    },

    /// HTTP transport error (connection, read, or abrupt close)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stream is already open on this session
    #[error("Session busy: a stream is already open")]
    SessionBusy,

    /// Operation not valid for the current session status
    #[error("Invalid operation `{operation}` while session is {status}")]
    InvalidState {
        /// Name of the rejected operation
        operation: &'static str,
        /// Status at the time of the call
        status: SessionStatus,
    },

    /// Operation requires a discussion but none exists yet
    #[error("No discussion is open")]
    NoDiscussion,

    /// A mention did not resolve to any persona
    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    /// No personas are configured for the panel
    #[error("No personas available; add at least one persona first")]
    NoPersonas,

    /// Symbol extraction found nothing to enhance with
    #[error("No market symbols found in the discussion")]
    NoSymbols,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Layered configuration loading error
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Tracing error
    #[error("Tracing error: {0}")]
    Tracing(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a backend status error
    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(operation: &'static str, status: SessionStatus) -> Self {
        Self::InvalidState { operation, status }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error means the transport failed mid-operation.
    ///
    /// These are the failures surfaced to the user as a dismissible notice.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Backend { .. } | Self::Serialization(_)
        )
    }

    /// Whether this error was a synchronous rejection with no network call.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::SessionBusy
                | Self::InvalidState { .. }
                | Self::NoDiscussion
                | Self::PersonaNotFound(_)
                | Self::NoPersonas
                | Self::InvalidInput(_)
        )
    }
}
