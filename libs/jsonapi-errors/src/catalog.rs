//! Error catalog support (`ErrDef` static definitions)

use crate::error_object::ErrorObject;
use http::StatusCode;

/// Static error definition from catalog
#[derive(Debug, Clone, Copy)]
pub struct ErrDef {
    pub status: u16,
    pub title: &'static str,
    pub code: &'static str,
}

impl ErrDef {
    /// Convert this error definition into an error object with the given detail
    #[inline]
    pub fn as_error(&self, detail: impl Into<String>) -> ErrorObject {
        ErrorObject::new(self.status_code(), self.title, detail.into()).with_code(self.code)
    }

    /// Out-of-range codes render as 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_def_to_error_object_works() {
        let def = ErrDef {
            status: StatusCode::NOT_FOUND.as_u16(),
            title: "Not Found",
            code: "test_not_found",
        };

        let err = def.as_error("Resource missing");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.title, "Not Found");
        assert_eq!(err.detail, "Resource missing");
        assert_eq!(err.code.as_deref(), Some("test_not_found"));
    }

    #[test]
    fn invalid_status_falls_back_to_500() {
        let def = ErrDef {
            status: 42,
            title: "Broken",
            code: "broken",
        };
        assert_eq!(def.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(def.as_error("x").status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
