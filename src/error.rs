use thiserror::Error;

use crate::storage::StoreError;

/// Error taxonomy for the coordination engine. Nothing here is fatal to the
/// process; every failure is scoped to the request that triggered it and
/// reported back only to its initiator.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Storage collaborator failure. Logged and surfaced as a generic
    /// failure; the engine does not retry on its own.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Invalid(String),
}

impl SessionError {
    /// Stable wire code carried by `ServerMessage::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::Conflict(_) => "CONFLICT",
            SessionError::Unauthorized(_) => "UNAUTHORIZED",
            SessionError::Unavailable(_) => "UNAVAILABLE",
            SessionError::Invalid(_) => "INVALID",
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => {
                SessionError::Conflict(format!("{} already exists", what))
            }
            StoreError::Unavailable(msg) => SessionError::Unavailable(msg),
        }
    }
}
