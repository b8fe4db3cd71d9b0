//! Domain errors of the request pipeline.

use resource_controller_sdk::{AuthError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Missing, invalid or expired access token
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    /// Valid token, but the principal may not perform the operation
    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("relationship '{relation}' is not valid for {resource_type}: {reason}")]
    InvalidRelation {
        resource_type: String,
        relation: String,
        reason: String,
    },

    #[error("{resource_type}.{attribute} cannot transition from {from} to '{to}'")]
    InvalidTransition {
        resource_type: String,
        attribute: String,
        from: String,
        to: String,
    },

    #[error("malformed payload at {pointer}: {message}")]
    MalformedPayload { pointer: String, message: String },

    #[error("malformed query parameter '{parameter}': {message}")]
    MalformedQuery { parameter: String, message: String },

    #[error("{resource_type} '{id}' already exists")]
    Conflict { resource_type: String, id: String },

    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),

    /// Fatal setup error (unknown resource type, inconsistent schema)
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn resource_not_found(resource_type: &str, id: &str) -> Self {
        Self::NotFound(format!("{resource_type} '{id}' not found"))
    }

    pub fn invalid_relation(
        resource_type: impl Into<String>,
        relation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            resource_type: resource_type.into(),
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            pointer: pointer.into(),
            message: message.into(),
        }
    }

    pub fn malformed_query(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedQuery {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Validation-category errors render as 422.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRelation { .. }
                | Self::InvalidTransition { .. }
                | Self::MalformedPayload { .. }
                | Self::MalformedQuery { .. }
        )
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { resource_type, id } => {
                Self::resource_not_found(&resource_type, &id)
            }
            StoreError::Conflict { resource_type, id } => Self::Conflict { resource_type, id },
            other => Self::Persistence(other),
        }
    }
}

impl From<AuthError> for DomainError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden => Self::Forbidden(err.to_string()),
            AuthError::Internal(msg) => Self::Internal(msg),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}
