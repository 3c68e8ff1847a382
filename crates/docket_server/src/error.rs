//! Error types for the document server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while answering a request.
///
/// Inside a multi-get these become the status of the one failing response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler for the requested path.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// The requested index does not exist.
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// An index with that name already exists.
    #[error("index already exists: {0}")]
    IndexExists(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status of a response carrying this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::UnknownRoute(_) => 400,
            ServerError::UnknownIndex(_) => 404,
            ServerError::IndexExists(_) => 409,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
