use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, StatusCode};
use resource_controller_sdk::{Document, JSONAPI_MEDIA_TYPE};
use serde_json::Value;

/// Terminal result of a request: status, rendered body, headers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// The serialized document; `None` for 204 responses.
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        let mut headers = HeaderMap::new();
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSONAPI_MEDIA_TYPE));
        }
        Self {
            status,
            body,
            headers,
        }
    }

    /// Render `document`; a document that fails to serialize becomes a bare
    /// 500 so a half-written body never goes out.
    #[must_use]
    pub fn document(status: StatusCode, document: &Document) -> Self {
        match serde_json::to_value(document) {
            Ok(body) => Self::new(status, Some(body)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response document");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        }
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, Some(body))
    }

    /// 201 with a `Location` header pointing at the new resource.
    #[must_use]
    pub fn created(document: &Document, location: &str) -> Self {
        let mut response = Self::document(StatusCode::CREATED, document);
        let header = HeaderValue::from_str(location)
            .ok()
            .filter(|_| response.status == StatusCode::CREATED);
        if let Some(value) = header {
            response.headers.insert(LOCATION, value);
        }
        response
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    /// The body as JSON; `Value::Null` when there is none.
    #[must_use]
    pub fn body_json(&self) -> Value {
        self.body.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_controller_sdk::{Linkage, ResourceIdentifier};

    #[test]
    fn bodies_carry_the_jsonapi_media_type() {
        let doc = Document::linkage(Linkage::ToOne(Some(ResourceIdentifier::new("topic", "7"))));

        let created = ApiResponse::created(&doc, "/article/1");

        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.headers[CONTENT_TYPE], JSONAPI_MEDIA_TYPE);
        assert_eq!(created.headers[LOCATION], "/article/1");
        assert_eq!(created.body_json()["data"]["id"], "7");
    }

    #[test]
    fn no_content_has_neither_body_nor_content_type() {
        let response = ApiResponse::no_content();

        assert!(response.body.is_none());
        assert!(!response.headers.contains_key(CONTENT_TYPE));
        assert_eq!(response.body_json(), Value::Null);
    }
}
