//! Resource Controller
//!
//! JSON:API CRUD and relationship management for any resource type described
//! by a [`ResourceSchema`], with per-request pipeline options: token
//! authorization, read caching with stampede protection, state-machine
//! validation, attribute spell checking and bitmask attribute packing.
//!
//! The public contract (document models, collaborator traits) lives in
//! `resource-controller-sdk` and is re-exported here.
//!
//! ## Request pipeline
//!
//! `Received -> Authorized -> Validated -> Executed -> Serialized -> Done`,
//! with an absorbing `Error` state. Every failure is rendered as a JSON:API
//! `errors` document; partial `data` is never returned.

pub use resource_controller_sdk::{
    AttrValue, Attributes, CacheBackend, ConfigOptions, Dictionary, Document, JSONAPI_MEDIA_TYPE,
    Linkage, PrimaryData, Principal, ResourceIdentifier, ResourceObject, ResourceStore, SortOrder,
    StoredResource, TokenVerifier,
};

pub mod api;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infra;

#[cfg(test)]
mod config_tests;

pub use api::{ApiRequest, ApiResponse, ControllerMethod, QueryParams};
pub use config::ControllerConfig;
pub use domain::cache::{CacheCoordinator, CacheKey, Generation};
pub use domain::controller::{ControllerServices, ResourceController};
pub use domain::error::DomainError;
pub use domain::schema::{
    AttrKind, BitMaskSpec, Cardinality, IdPolicy, ResourceSchema, SchemaRegistry, StateGraph,
};
