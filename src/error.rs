//! Error types shared by every bracket operation.

use thiserror::Error;

pub type BracketResult<T> = Result<T, BracketError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    /// Tournament, matchup, round or vote does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The request is well formed but the bracket is not in a state that allows it.
    #[error("{0}")]
    InvalidState(String),

    /// Competitor outside the matchup, malformed template, bad identifiers.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Lock poisoning or a failed durable write. The transaction was rolled back.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidInput,
    Unauthorized,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        }
    }
}

impl BracketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BracketError::NotFound(_) => ErrorKind::NotFound,
            BracketError::InvalidState(_) => ErrorKind::InvalidState,
            BracketError::InvalidInput(_) => ErrorKind::InvalidInput,
            BracketError::Unauthorized(_) => ErrorKind::Unauthorized,
            BracketError::Conflict(_) => ErrorKind::Conflict,
            BracketError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        BracketError::NotFound(what.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        BracketError::InvalidState(reason.into())
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        BracketError::InvalidInput(reason.into())
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        BracketError::Storage(reason.into())
    }
}
