//! Linkage management between a primary resource and one declared relation.
//!
//! Every mutation computes the complete target link set in memory and
//! persists it with a single `set_links` call.

use resource_controller_sdk::{Linkage, ResourceIdentifier};

use super::error::DomainError;
use super::schema::{Cardinality, RelationDecl, ResourceSchema};
use super::store::StoreGateway;

/// Shape `refs` according to the relation's cardinality.
#[must_use]
pub fn linkage_for(decl: &RelationDecl, refs: Vec<ResourceIdentifier>) -> Linkage {
    match decl.cardinality {
        Cardinality::ToOne => Linkage::ToOne(refs.into_iter().next()),
        Cardinality::ToMany => Linkage::ToMany(refs),
    }
}

pub struct RelationshipManager<'a> {
    store: &'a StoreGateway,
    schema: &'a ResourceSchema,
}

impl<'a> RelationshipManager<'a> {
    #[must_use]
    pub fn new(store: &'a StoreGateway, schema: &'a ResourceSchema) -> Self {
        Self { store, schema }
    }

    /// # Errors
    ///
    /// `InvalidRelation` when `relation` is not declared on the primary type.
    pub fn relation(&self, relation: &str) -> Result<&'a RelationDecl, DomainError> {
        self.schema.require_relation(relation)
    }

    async fn current(&self, id: &str, decl: &RelationDecl) -> Result<Vec<ResourceIdentifier>, DomainError> {
        self.store
            .find_links(self.schema.resource_type(), id, &decl.name)
            .await
    }

    async fn persist(
        &self,
        id: &str,
        decl: &RelationDecl,
        links: Vec<ResourceIdentifier>,
    ) -> Result<(), DomainError> {
        self.store
            .set_links(self.schema.resource_type(), id, &decl.name, links)
            .await
    }

    /// Current linkage. An unset to-one relation is `NotFound`; an empty
    /// to-many relation is an empty list.
    ///
    /// # Errors
    ///
    /// `InvalidRelation` for undeclared relations, `NotFound` when the
    /// primary resource or a to-one link does not exist.
    #[tracing::instrument(skip(self), fields(resource_type = self.schema.resource_type()))]
    pub async fn read(&self, id: &str, relation: &str) -> Result<Linkage, DomainError> {
        let decl = self.relation(relation)?;
        let links = self.current(id, decl).await?;
        if decl.cardinality == Cardinality::ToOne && links.is_empty() {
            return Err(DomainError::NotFound(format!(
                "{} '{id}' has no '{relation}' linkage",
                self.schema.resource_type()
            )));
        }
        Ok(linkage_for(decl, links))
    }

    /// Add links; refs already linked are skipped. For a to-one relation
    /// the given ref becomes the link.
    ///
    /// # Errors
    ///
    /// `InvalidRelation` for undeclared relations, `NotFound` for a missing
    /// primary resource.
    #[tracing::instrument(skip(self, linkage), fields(resource_type = self.schema.resource_type()))]
    pub async fn create(&self, id: &str, relation: &str, linkage: &Linkage) -> Result<Linkage, DomainError> {
        let decl = self.relation(relation)?;
        let current = self.current(id, decl).await?;
        let target = match decl.cardinality {
            Cardinality::ToOne => match linkage.refs().into_iter().next() {
                Some(r) => vec![r],
                None => current.clone(),
            },
            Cardinality::ToMany => merged(&current, linkage.refs()),
        };
        self.write_if_changed(id, decl, &current, target).await
    }

    /// Replace the link of a to-one relation (`null` clears it), or append
    /// to a to-many relation.
    ///
    /// # Errors
    ///
    /// `InvalidRelation` for undeclared relations, `NotFound` for a missing
    /// primary resource.
    #[tracing::instrument(skip(self, linkage), fields(resource_type = self.schema.resource_type()))]
    pub async fn update(&self, id: &str, relation: &str, linkage: &Linkage) -> Result<Linkage, DomainError> {
        let decl = self.relation(relation)?;
        let current = self.current(id, decl).await?;
        let target = match decl.cardinality {
            Cardinality::ToOne => linkage.refs().into_iter().take(1).collect(),
            Cardinality::ToMany => merged(&current, linkage.refs()),
        };
        self.write_if_changed(id, decl, &current, target).await
    }

    /// Remove the given refs; every one of them must currently be linked.
    ///
    /// # Errors
    ///
    /// `InvalidRelation` for undeclared relations, `NotFound` for a missing
    /// primary resource or a ref that is not linked.
    #[tracing::instrument(skip(self, refs), fields(resource_type = self.schema.resource_type()))]
    pub async fn delete(&self, id: &str, relation: &str, refs: &[ResourceIdentifier]) -> Result<(), DomainError> {
        let decl = self.relation(relation)?;
        let current = self.current(id, decl).await?;
        if let Some(missing) = refs.iter().find(|r| !current.contains(r)) {
            return Err(DomainError::NotFound(format!(
                "{} '{}' is not linked to {} '{id}' via '{relation}'",
                missing.resource_type,
                missing.id,
                self.schema.resource_type()
            )));
        }
        let target: Vec<ResourceIdentifier> = current
            .iter()
            .filter(|r| !refs.contains(r))
            .cloned()
            .collect();
        self.write_if_changed(id, decl, &current, target).await?;
        Ok(())
    }

    async fn write_if_changed(
        &self,
        id: &str,
        decl: &RelationDecl,
        current: &[ResourceIdentifier],
        target: Vec<ResourceIdentifier>,
    ) -> Result<Linkage, DomainError> {
        if target.as_slice() == current {
            tracing::debug!(relation = %decl.name, "Linkage unchanged");
        } else {
            self.persist(id, decl, target.clone()).await?;
            tracing::debug!(relation = %decl.name, links = target.len(), "Linkage stored");
        }
        Ok(linkage_for(decl, target))
    }
}

fn merged(current: &[ResourceIdentifier], added: Vec<ResourceIdentifier>) -> Vec<ResourceIdentifier> {
    let mut links = current.to_vec();
    for r in added {
        if !links.contains(&r) {
            links.push(r);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{AttrKind, AttributeDecl};
    use crate::infra::storage::InMemoryStore;
    use resource_controller_sdk::{ResourceStore, StoredResource};
    use std::sync::Arc;
    use std::time::Duration;

    fn schema() -> ResourceSchema {
        ResourceSchema::builder("article")
            .attribute(AttributeDecl::new("title", AttrKind::String))
            .to_one("topic", "topic")
            .to_many("tags", "tag")
            .build()
            .unwrap()
    }

    async fn gateway() -> StoreGateway {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(
                "article",
                StoredResource {
                    id: "1".to_owned(),
                    ..StoredResource::default()
                },
            )
            .await
            .unwrap();
        StoreGateway::new(store, Duration::from_secs(1))
    }

    fn tag(id: &str) -> ResourceIdentifier {
        ResourceIdentifier::new("tag", id)
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = gateway().await;
        let schema = schema();
        let manager = RelationshipManager::new(&store, &schema);
        let linkage = Linkage::ToMany(vec![tag("1"), tag("2")]);

        let first = manager.create("1", "tags", &linkage).await.unwrap();
        let second = manager.create("1", "tags", &linkage).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            manager.read("1", "tags").await.unwrap(),
            Linkage::ToMany(vec![tag("1"), tag("2")])
        );
    }

    #[tokio::test]
    async fn update_replaces_to_one_and_appends_to_many() {
        let store = gateway().await;
        let schema = schema();
        let manager = RelationshipManager::new(&store, &schema);
        let topic = |id: &str| Linkage::ToOne(Some(ResourceIdentifier::new("topic", id)));

        manager.update("1", "topic", &topic("7")).await.unwrap();
        manager.update("1", "topic", &topic("8")).await.unwrap();
        assert_eq!(manager.read("1", "topic").await.unwrap(), topic("8"));

        manager
            .update("1", "tags", &Linkage::ToMany(vec![tag("1")]))
            .await
            .unwrap();
        manager
            .update("1", "tags", &Linkage::ToMany(vec![tag("2"), tag("1")]))
            .await
            .unwrap();
        assert_eq!(
            manager.read("1", "tags").await.unwrap(),
            Linkage::ToMany(vec![tag("1"), tag("2")])
        );

        manager.update("1", "topic", &Linkage::ToOne(None)).await.unwrap();
        assert!(matches!(
            manager.read("1", "topic").await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_requires_every_ref_to_be_linked() {
        let store = gateway().await;
        let schema = schema();
        let manager = RelationshipManager::new(&store, &schema);
        manager
            .create("1", "tags", &Linkage::ToMany(vec![tag("1"), tag("2")]))
            .await
            .unwrap();

        assert!(matches!(
            manager.delete("1", "tags", &[tag("2"), tag("3")]).await,
            Err(DomainError::NotFound(_))
        ));
        assert_eq!(
            manager.read("1", "tags").await.unwrap(),
            Linkage::ToMany(vec![tag("1"), tag("2")])
        );

        manager.delete("1", "tags", &[tag("2")]).await.unwrap();
        assert_eq!(
            manager.read("1", "tags").await.unwrap(),
            Linkage::ToMany(vec![tag("1")])
        );
    }

    #[tokio::test]
    async fn undeclared_relation_and_missing_primary() {
        let store = gateway().await;
        let schema = schema();
        let manager = RelationshipManager::new(&store, &schema);
        assert!(matches!(
            manager.read("1", "author").await,
            Err(DomainError::InvalidRelation { .. })
        ));
        assert!(matches!(
            manager.read("404", "tags").await,
            Err(DomainError::NotFound(_))
        ));
    }
}
