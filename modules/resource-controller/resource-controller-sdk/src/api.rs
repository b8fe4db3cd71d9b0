//! Collaborator contracts consumed by the resource controller.
//!
//! Implementations are shared across requests, so every trait is
//! `Send + Sync` and used behind `Arc<dyn ...>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, CacheError, StoreError};
use crate::models::{CacheEntry, ListQuery, Page, ResourceIdentifier, StoredResource};

/// Persistence collaborator.
///
/// Treated as authoritative. Relationship mutations on the same primary
/// resource from concurrent requests are serialized here, not by the caller.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one record; `Ok(None)` when absent.
    async fn find(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StoreError>;

    /// List records honoring limit/page/sort/filter.
    async fn list(
        &self,
        resource_type: &str,
        query: &ListQuery,
    ) -> Result<Page<StoredResource>, StoreError>;

    /// Insert a new record together with its links.
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` when the id is taken.
    async fn insert(
        &self,
        resource_type: &str,
        record: StoredResource,
    ) -> Result<StoredResource, StoreError>;

    /// Replace an existing record (attributes and links) in one step.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the record does not exist.
    async fn replace(
        &self,
        resource_type: &str,
        id: &str,
        record: StoredResource,
    ) -> Result<StoredResource, StoreError>;

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the record does not exist.
    async fn remove(&self, resource_type: &str, id: &str) -> Result<(), StoreError>;

    /// Current links of one relation of a record.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the primary record does not exist.
    async fn find_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
    ) -> Result<Vec<ResourceIdentifier>, StoreError>;

    /// Atomically replace the full link set of one relation of a record.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the primary record does not exist.
    async fn set_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
        links: Vec<ResourceIdentifier>,
    ) -> Result<(), StoreError>;
}

/// Authenticated caller, as resolved by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub table: String,
}

/// Auth collaborator: validates (never issues) access tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` against the principals stored in `table`.
    async fn verify(&self, token: &str, table: &str) -> Result<Principal, AuthError>;
}

/// Dictionary collaborator used by spell checking.
pub trait Dictionary: Send + Sync {
    /// Whether `word` is a known word.
    fn check(&self, word: &str) -> bool;

    /// Candidate corrections for an unknown word, best first.
    fn suggest(&self, _word: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Storage behind the cache coordinator.
///
/// Writes to one key must be linearizable; different keys are independent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store or atomically overwrite an entry.
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry whose key starts with `prefix`; returns how many.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}
