//! Public models for the resource controller.
//!
//! These are transport-agnostic data structures shared between the
//! controller and its collaborators (persistence, cache backend).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::SortOrder;

/// Typed attribute value.
///
/// Serialized untagged so the wire form is the plain JSON scalar
/// (`"2017-12-12"` for dates, `"10:11:12"` for times).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
    String(String),
}

impl AttrValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Integer(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            AttrValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            AttrValue::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

/// Attribute bag keyed by declared field name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// `{type, id}` reference to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Resource linkage: a single (possibly empty) ref for to-one relations,
/// an ordered list for to-many relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    ToMany(Vec<ResourceIdentifier>),
    ToOne(Option<ResourceIdentifier>),
}

impl Linkage {
    /// Flatten to the list of refs regardless of cardinality.
    #[must_use]
    pub fn refs(&self) -> Vec<ResourceIdentifier> {
        match self {
            Linkage::ToMany(refs) => refs.clone(),
            Linkage::ToOne(r) => r.iter().cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Linkage::ToMany(refs) => refs.is_empty(),
            Linkage::ToOne(r) => r.is_none(),
        }
    }
}

/// `{ "data": <linkage> }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipObject {
    pub data: Linkage,
}

/// A JSON:API resource object as rendered in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipObject>,
}

/// A resource as held by the persistence collaborator: attributes in their
/// stored (encoded) form plus the linkage of every relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredResource {
    pub id: String,
    pub attributes: Attributes,
    pub links: BTreeMap<String, Vec<ResourceIdentifier>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Normalized listing request handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub limit: u64,
    /// 1-based page number
    pub page: u64,
    pub sort: Vec<SortKey>,
    /// Equality filters on stored attributes
    pub filter: BTreeMap<String, AttrValue>,
}

impl ListQuery {
    /// Number of records to skip for the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of a listing plus the total number of matching records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// A cached, serialized read result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Bytes,
    pub stored_at: Instant,
    pub ttl: Duration,
    /// Wall-clock cost of producing `value`, used for early recomputation.
    pub delta: Duration,
}

impl CacheEntry {
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= self.ttl
    }
}
