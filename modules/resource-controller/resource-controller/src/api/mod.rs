//! Transport-facing request/response types and error rendering.

pub mod error;
pub mod request;
pub mod response;

pub use error::{domain_error_to_error_object, error_response};
pub use request::{ApiRequest, ControllerMethod, QueryParams};
pub use response::ApiResponse;
