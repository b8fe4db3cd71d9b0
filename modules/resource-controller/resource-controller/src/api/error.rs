use jsonapi_errors::ErrorObject;
use resource_controller_sdk::Document;

use super::response::ApiResponse;
use crate::domain::error::DomainError;
use crate::errors::ErrorCode;

/// Map a domain error to a JSON:API error object using the error catalog.
///
/// 5xx details are logged, never rendered.
pub fn domain_error_to_error_object(e: &DomainError) -> ErrorObject {
    let trace_id = tracing::Span::current()
        .id()
        .map(|id| id.into_u64().to_string());

    let error = match e {
        DomainError::Unauthorized(msg) => {
            tracing::debug!(reason = %msg, "Request not authenticated");
            ErrorCode::UNAUTHORIZED.as_error("A valid access token is required")
        }
        DomainError::Forbidden(msg) => {
            tracing::warn!(error = ?e, "Access forbidden: {msg}");
            ErrorCode::FORBIDDEN.as_error("The access token does not grant this operation")
        }
        DomainError::NotFound(msg) => ErrorCode::NOT_FOUND.as_error(msg.clone()),
        DomainError::Conflict { .. } => ErrorCode::CONFLICT
            .as_error(e.to_string())
            .with_pointer("/data/id"),
        DomainError::InvalidRelation { relation, .. } => ErrorCode::INVALID_RELATION
            .as_error(e.to_string())
            .with_pointer(format!("/data/relationships/{relation}")),
        DomainError::InvalidTransition { attribute, .. } => ErrorCode::INVALID_TRANSITION
            .as_error(e.to_string())
            .with_pointer(format!("/data/attributes/{attribute}")),
        DomainError::MalformedPayload { pointer, message } => ErrorCode::MALFORMED_PAYLOAD
            .as_error(message.clone())
            .with_pointer(pointer.clone()),
        DomainError::MalformedQuery { parameter, message } => ErrorCode::MALFORMED_QUERY
            .as_error(message.clone())
            .with_parameter(parameter.clone()),
        DomainError::Persistence(source) => {
            tracing::error!(error = %source, "Persistence failure");
            ErrorCode::INTERNAL.as_error("An internal error occurred")
        }
        DomainError::Configuration(msg) => {
            tracing::error!(error = %msg, "Controller misconfigured");
            ErrorCode::INTERNAL.as_error("An internal error occurred")
        }
        DomainError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal error");
            ErrorCode::INTERNAL.as_error("An internal error occurred")
        }
    };

    jsonapi_errors::finalize(error, trace_id)
}

/// Render `e` as an `errors` document with the matching status.
pub fn error_response(e: &DomainError) -> ApiResponse {
    let error = domain_error_to_error_object(e);
    ApiResponse::document(error.status, &Document::errors(vec![error]))
}

impl From<DomainError> for ApiResponse {
    fn from(e: DomainError) -> Self {
        error_response(&e)
    }
}
