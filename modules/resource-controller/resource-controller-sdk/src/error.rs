//! Error types reported by the controller's collaborators.

use thiserror::Error;

/// Errors reported by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist
    #[error("{resource_type} '{id}' not found")]
    NotFound { resource_type: String, id: String },

    /// A record with the same id already exists
    #[error("{resource_type} '{id}' already exists")]
    Conflict { resource_type: String, id: String },

    /// The call did not complete in time
    #[error("persistence call timed out after {millis} ms")]
    Timeout { millis: u128 },

    /// Any other backend failure
    #[error("persistence backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors reported by the auth collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Forbidden: insufficient permissions")]
    Forbidden,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a cache backend. Never surfaced to API callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache call timed out")]
    Timeout,
}
