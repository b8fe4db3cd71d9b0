//! Core error types for JSON:API responses
//!
//! This crate provides pure data types for error handling, with no dependencies
//! on HTTP frameworks. It includes:
//! - JSON:API error objects (`ErrorObject`)
//! - Error catalog support (`ErrDef`)

pub mod catalog;
pub mod error_object;

// Re-export commonly used types
pub use catalog::ErrDef;
pub use error_object::{ErrorObject, ErrorSource};

/// Helper to attach an occurrence id (usually the trace id) to an error object.
///
/// Mirrors what the transport layer does right before rendering the
/// `errors` array of a JSON:API document.
pub fn finalize(mut e: ErrorObject, trace_id: Option<String>) -> ErrorObject {
    if let Some(tid) = trace_id {
        e = e.with_id(tid);
    }
    e
}
