//! Resource Controller SDK
//!
//! Transport-agnostic contract of the resource controller:
//! - JSON:API document models ([`Document`], [`ResourceObject`], [`Linkage`])
//! - per-request pipeline settings ([`ConfigOptions`])
//! - collaborator traits the controller consumes ([`ResourceStore`],
//!   [`TokenVerifier`], [`Dictionary`], [`CacheBackend`])
//! - collaborator error types

pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod models;

pub use api::{CacheBackend, Dictionary, Principal, ResourceStore, TokenVerifier};
pub use config::{ConfigOptions, SortOrder};
pub use document::{Document, JSONAPI_MEDIA_TYPE, PrimaryData};
pub use error::{AuthError, CacheError, StoreError};
pub use models::{
    AttrValue, Attributes, CacheEntry, Linkage, ListQuery, Page, RelationshipObject,
    ResourceIdentifier, ResourceObject, SortKey, StoredResource,
};
