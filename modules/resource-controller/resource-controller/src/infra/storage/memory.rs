//! In-memory persistence collaborator.
//!
//! Every mutation takes the write lock, so relationship updates on the same
//! record from concurrent requests are serialized here.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use resource_controller_sdk::{
    AttrValue, ListQuery, Page, ResourceIdentifier, ResourceStore, SortKey, SortOrder, StoreError,
    StoredResource,
};
use tokio::sync::RwLock;

type Table = BTreeMap<String, StoredResource>;

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of `resource_type`.
    pub async fn count(&self, resource_type: &str) -> usize {
        self.tables
            .read()
            .await
            .get(resource_type)
            .map_or(0, BTreeMap::len)
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn compare_values(a: Option<&AttrValue>, b: Option<&AttrValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(AttrValue::Integer(x)), Some(AttrValue::Integer(y))) => x.cmp(y),
        (Some(AttrValue::Float(x)), Some(AttrValue::Float(y))) => x.total_cmp(y),
        (Some(AttrValue::Bool(x)), Some(AttrValue::Bool(y))) => x.cmp(y),
        (Some(AttrValue::Date(x)), Some(AttrValue::Date(y))) => x.cmp(y),
        (Some(AttrValue::Time(x)), Some(AttrValue::Time(y))) => x.cmp(y),
        (Some(AttrValue::DateTime(x)), Some(AttrValue::DateTime(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn compare_records(a: &StoredResource, b: &StoredResource, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = if key.field == "id" {
            compare_ids(&a.id, &b.id)
        } else {
            compare_values(a.attributes.get(&key.field), b.attributes.get(&key.field))
        };
        let ord = match key.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn matches(record: &StoredResource, filter: &BTreeMap<String, AttrValue>) -> bool {
    filter.iter().all(|(attr, expected)| {
        let actual = record.attributes.get(attr).unwrap_or(&AttrValue::Null);
        actual == expected || actual.to_string() == expected.to_string()
    })
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn find(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .get(resource_type)
            .and_then(|t| t.get(id))
            .cloned())
    }

    async fn list(
        &self,
        resource_type: &str,
        query: &ListQuery,
    ) -> Result<Page<StoredResource>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<&StoredResource> = tables
            .get(resource_type)
            .map(|t| t.values().filter(|r| matches(r, &query.filter)).collect())
            .unwrap_or_default();
        items.sort_by(|a, b| compare_records(a, b, &query.sort));

        let total = u64::try_from(items.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let items = items
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    async fn insert(
        &self,
        resource_type: &str,
        record: StoredResource,
    ) -> Result<StoredResource, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(resource_type.to_owned()).or_default();
        if table.contains_key(&record.id) {
            return Err(StoreError::conflict(resource_type, record.id));
        }
        table.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn replace(
        &self,
        resource_type: &str,
        id: &str,
        mut record: StoredResource,
    ) -> Result<StoredResource, StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .get_mut(resource_type)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;
        id.clone_into(&mut record.id);
        *slot = record.clone();
        Ok(record)
    }

    async fn remove(&self, resource_type: &str, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .get_mut(resource_type)
            .and_then(|t| t.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(resource_type, id))
    }

    async fn find_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
    ) -> Result<Vec<ResourceIdentifier>, StoreError> {
        let tables = self.tables.read().await;
        let record = tables
            .get(resource_type)
            .and_then(|t| t.get(id))
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;
        Ok(record.links.get(relation).cloned().unwrap_or_default())
    }

    async fn set_links(
        &self,
        resource_type: &str,
        id: &str,
        relation: &str,
        links: Vec<ResourceIdentifier>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .get_mut(resource_type)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;
        if links.is_empty() {
            record.links.remove(relation);
        } else {
            record.links.insert(relation.to_owned(), links);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, rating: i64) -> StoredResource {
        StoredResource {
            id: id.to_owned(),
            attributes: BTreeMap::from([
                ("title".to_owned(), AttrValue::String(title.to_owned())),
                ("rating".to_owned(), AttrValue::Integer(rating)),
            ]),
            links: BTreeMap::new(),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, title, rating) in [("1", "b", 3), ("2", "a", 5), ("10", "c", 3)] {
            store.insert("article", record(id, title, rating)).await.unwrap();
        }
        store
    }

    fn query(sort: &[(&str, SortOrder)]) -> ListQuery {
        ListQuery {
            limit: 2,
            page: 1,
            sort: sort
                .iter()
                .map(|(f, o)| SortKey {
                    field: (*f).to_owned(),
                    order: *o,
                })
                .collect(),
            filter: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn list_sorts_pages_and_counts() {
        let store = seeded().await;

        let page = store
            .list("article", &query(&[("rating", SortOrder::Desc), ("id", SortOrder::Asc)]))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<&str> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);

        let mut second = query(&[("id", SortOrder::Asc)]);
        second.page = 2;
        let page = store.list("article", &second).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "10");
    }

    #[tokio::test]
    async fn list_applies_equality_filters() {
        let store = seeded().await;
        let mut q = query(&[("id", SortOrder::Asc)]);
        q.limit = 10;
        q.filter.insert("rating".to_owned(), AttrValue::Integer(3));
        let page = store.list("article", &q).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn insert_conflicts_and_missing_records_are_not_found() {
        let store = seeded().await;
        assert!(matches!(
            store.insert("article", record("1", "x", 0)).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.replace("article", "99", record("99", "x", 0)).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.set_links("article", "99", "topic", vec![]).await,
            Err(StoreError::NotFound { .. })
        ));
        store.remove("article", "1").await.unwrap();
        assert!(store.remove("article", "1").await.is_err());
        assert_eq!(store.count("article").await, 2);
    }

    #[tokio::test]
    async fn links_are_replaced_as_a_whole() {
        let store = seeded().await;
        let links = vec![
            ResourceIdentifier::new("tag", "1"),
            ResourceIdentifier::new("tag", "2"),
        ];
        store
            .set_links("article", "1", "tags", links.clone())
            .await
            .unwrap();
        assert_eq!(store.find_links("article", "1", "tags").await.unwrap(), links);

        store.set_links("article", "1", "tags", vec![]).await.unwrap();
        assert!(store.find_links("article", "1", "tags").await.unwrap().is_empty());
    }
}
