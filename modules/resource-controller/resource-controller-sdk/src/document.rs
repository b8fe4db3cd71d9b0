//! Top-level JSON:API document.

use jsonapi_errors::ErrorObject;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{Linkage, ResourceObject};

/// Media type of JSON:API documents.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Primary data of a document.
///
/// Deserialization tries resource shapes before linkage shapes: resource
/// objects always carry `attributes`, identifiers never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Resource(Box<ResourceObject>),
    Collection(Vec<ResourceObject>),
    Linkage(Linkage),
}

/// `{ data, included, errors, meta }`
///
/// A document carries either `data` or `errors`, never both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<ResourceObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Document {
    #[must_use]
    pub fn resource(resource: ResourceObject) -> Self {
        Self {
            data: Some(PrimaryData::Resource(Box::new(resource))),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn collection(resources: Vec<ResourceObject>) -> Self {
        Self {
            data: Some(PrimaryData::Collection(resources)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn linkage(linkage: Linkage) -> Self {
        Self {
            data: Some(PrimaryData::Linkage(linkage)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            errors: Some(errors),
            ..Self::default()
        }
    }

    /// Set `included`, leaving it absent when there is nothing to include.
    #[must_use]
    pub fn with_included(mut self, included: Vec<ResourceObject>) -> Self {
        self.included = if included.is_empty() {
            None
        } else {
            Some(included)
        };
        self
    }

    /// Insert one `meta` member.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttrValue, Attributes, RelationshipObject, ResourceIdentifier};
    use http::StatusCode;
    use std::collections::BTreeMap;

    fn article() -> ResourceObject {
        let mut attributes = Attributes::new();
        attributes.insert("title".to_owned(), AttrValue::String("A".to_owned()));
        let mut relationships = BTreeMap::new();
        relationships.insert(
            "topic".to_owned(),
            RelationshipObject {
                data: Linkage::ToOne(Some(ResourceIdentifier::new("topic", "7"))),
            },
        );
        ResourceObject {
            resource_type: "article".to_owned(),
            id: "a1".to_owned(),
            attributes,
            relationships,
        }
    }

    #[test]
    fn resource_document_wire_shape() {
        let doc = Document::resource(article());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "type": "article",
                    "id": "a1",
                    "attributes": {"title": "A"},
                    "relationships": {"topic": {"data": {"type": "topic", "id": "7"}}}
                }
            })
        );
    }

    #[test]
    fn error_document_has_no_data() {
        let doc = Document::errors(vec![ErrorObject::new(
            StatusCode::NOT_FOUND,
            "Not Found",
            "article 'x' not found",
        )]);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["status"], "404");
    }

    #[test]
    fn empty_to_one_relationship_document_is_null_data() {
        let doc = Document::linkage(Linkage::ToOne(None));
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"data":null}"#);
    }

    #[test]
    fn documents_round_trip_through_json() {
        let doc = Document::collection(vec![article()])
            .with_meta("page", serde_json::json!({"number": 1}))
            .with_included(vec![]);
        let bytes = serde_json::to_vec(&doc).unwrap();
        let back: Document = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
        assert!(back.included.is_none());
    }

    #[test]
    fn identifier_arrays_deserialize_as_linkage() {
        let doc: Document =
            serde_json::from_str(r#"{"data":[{"type":"topic","id":"7"}]}"#).unwrap();
        assert!(matches!(
            doc.data,
            Some(PrimaryData::Linkage(Linkage::ToMany(ref refs))) if refs.len() == 1
        ));
    }
}
