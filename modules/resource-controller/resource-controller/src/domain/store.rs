//! Time-bounded access to the persistence collaborator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use resource_controller_sdk::{
    ListQuery, Page, ResourceIdentifier, ResourceStore, StoreError, StoredResource,
};

use super::error::DomainError;

/// Wraps every persistence call in a timeout; expiry surfaces as a
/// persistence failure.
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn ResourceStore>,
    timeout: Duration,
}

#[allow(clippy::missing_errors_doc)] // every call fails with the mapped `StoreError`
impl StoreGateway {
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, DomainError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(DomainError::from),
            Err(_) => {
                tracing::error!(op, timeout_ms = self.timeout.as_millis(), "Persistence call timed out");
                Err(DomainError::Persistence(StoreError::Timeout {
                    millis: self.timeout.as_millis(),
                }))
            }
        }
    }

    pub async fn find(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, DomainError> {
        self.bounded("find", self.store.find(resource_type, id)).await
    }

    /// Like [`find`](Self::find) but a missing record is `NotFound`.
    pub async fn require(&self, resource_type: &str, id: &str) -> Result<StoredResource, DomainError> {
        self.find(resource_type, id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found(resource_type, id))
    }

    pub async fn list(
        &self,
        resource_type: &str,
        query: &ListQuery,
    ) -> Result<Page<StoredResource>, DomainError> {
        self.bounded("list", self.store.list(resource_type, query)).await
    }

    pub async fn insert(
        &self,
        resource_type: &str,
        record: StoredResource,
    ) -> Result<StoredResource, DomainError> {
        self.bounded("insert", self.store.insert(resource_type, record)).await
    }

    pub async fn replace(
        &self,
        resource_type: &str,
        id: &str,
        record: StoredResource,
    ) -> Result<StoredResource, DomainError> {
        self.bounded("replace", self.store.replace(resource_type, id, record))
            .await
    }

    pub async fn remove(&self, resource_type: &str, id: &str) -> Result<(), DomainError> {
        self.bounded("remove", self.store.remove(resource_type, id)).await
    }

    pub async fn find_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
    ) -> Result<Vec<ResourceIdentifier>, DomainError> {
        self.bounded("find_links", self.store.find_links(resource_type, id, relation))
            .await
    }

    pub async fn set_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
        links: Vec<ResourceIdentifier>,
    ) -> Result<(), DomainError> {
        self.bounded(
            "set_links",
            self.store.set_links(resource_type, id, relation, links),
        )
        .await
    }
}
