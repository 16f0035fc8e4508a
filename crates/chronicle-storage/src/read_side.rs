//! Read-side storage: aggregates materialized as documents.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use chronicle_core::aggregate::{AggregateRoot, ID_FIELD};
use chronicle_core::collection::Collection;
use chronicle_core::criteria::Criteria;
use chronicle_core::error::DomainError;
use chronicle_core::storage::Storage;

use crate::document::{Document, DocumentStore, DocumentTranslator, FindOptions};

fn id_filter(ids: Vec<Value>) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_owned(), json!({"$in": ids}));
    filter
}

/// Storage materializing each aggregate's normalized state as one document
/// in a [`DocumentStore`].
///
/// Documents live in a collection named after the aggregate type and are
/// upserted by identifier. Criteria are compiled by [`DocumentTranslator`]
/// and evaluated by the store.
#[derive(Debug, Default)]
pub struct ReadSide<D> {
    store: D,
}

impl<D: DocumentStore> ReadSide<D> {
    /// Creates a read side over `store`.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Returns the underlying document store.
    pub fn store(&self) -> &D {
        &self.store
    }
}

#[async_trait]
impl<A, D> Storage<A> for ReadSide<D>
where
    A: AggregateRoot,
    D: DocumentStore,
{
    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME))]
    async fn select(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        let filter = DocumentTranslator.filter(criteria)?;
        let options = FindOptions::from_criteria(criteria);
        let documents = self.store.find(A::TYPE_NAME, &filter, &options).await?;
        debug!(found = documents.len(), "queried read side");
        documents.iter().map(A::denormalize).collect()
    }

    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME, id = %aggregate.id()))]
    async fn insert(&self, aggregate: &mut A) -> Result<(), DomainError> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), Value::String(aggregate.id().to_string()));
        self.store
            .replace_one(A::TYPE_NAME, &filter, aggregate.normalize(), true)
            .await?;
        aggregate.pull_events();
        Ok(())
    }

    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME))]
    async fn delete(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        let doomed = <Self as Storage<A>>::select(self, criteria).await?;
        if doomed.is_empty() {
            return Ok(doomed);
        }
        let ids = doomed
            .iter()
            .map(|aggregate| Value::String(aggregate.id().to_string()))
            .collect();
        let deleted = self.store.delete_many(A::TYPE_NAME, &id_filter(ids)).await?;
        debug!(deleted, "deleted documents");
        Ok(doomed)
    }

    async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError> {
        let filter = DocumentTranslator.filter(criteria)?;
        let count = self.store.count(A::TYPE_NAME, &filter).await?;
        usize::try_from(count).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chronicle_core::expression::eq;
    use chronicle_test_support::{FixedClock, Member, member};

    use super::*;
    use crate::document::MemoryDocumentStore;

    #[tokio::test]
    async fn test_insert_upserts_one_document_per_aggregate() {
        // Arrange
        let read_side = ReadSide::new(MemoryDocumentStore::new());
        let clock = FixedClock::at(0);
        let mut ada = member("ada", "Lyon", "active", 1, &clock).unwrap();

        // Act
        Storage::<Member>::insert(&read_side, &mut ada).await.unwrap();
        ada.award(4, &clock).unwrap();
        Storage::<Member>::update(&read_side, &mut ada).await.unwrap();

        // Assert
        let documents = read_side.store().documents("member").await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["score"], json!(5));
        assert_eq!(documents[0]["id"]["uuid"], json!(ada.id().to_string()));
        assert!(ada.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_selected_documents() {
        let read_side = ReadSide::new(MemoryDocumentStore::new());
        let clock = FixedClock::at(0);
        for (name, status) in [("ada", "active"), ("bob", "idle"), ("cyd", "idle")] {
            let mut m = member(name, "Lyon", status, 0, &clock).unwrap();
            Storage::<Member>::insert(&read_side, &mut m).await.unwrap();
        }

        let removed = Storage::<Member>::delete(&read_side, &Criteria::new().filter(eq("status", "idle")))
            .await
            .unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(Storage::<Member>::count(&read_side, &Criteria::new()).await.unwrap(), 1);
    }
}
