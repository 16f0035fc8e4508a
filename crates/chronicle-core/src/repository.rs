//! Repository facade over a storage backend.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::aggregate::{AggregateRoot, by_id};
use crate::collection::{Collection, Page};
use crate::criteria::Criteria;
use crate::error::DomainError;
use crate::identifier::Identifier;
use crate::storage::Storage;

/// Uniform access to the aggregates of one type, whatever the backend.
///
/// Existence checks always go to storage; the repository keeps no identity
/// cache.
pub struct Repository<A: AggregateRoot> {
    storage: Arc<dyn Storage<A>>,
}

impl<A: AggregateRoot> Clone for Repository<A> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<A: AggregateRoot> Repository<A> {
    /// Creates a repository over `storage`.
    pub fn new(storage: Arc<dyn Storage<A>>) -> Self {
        Self { storage }
    }

    /// Returns every stored aggregate.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn all(&self) -> Result<Collection<A>, DomainError> {
        self.storage.select(&Criteria::new()).await
    }

    /// Returns the aggregates matching `criteria`.
    ///
    /// # Errors
    ///
    /// Propagates storage and criteria translation errors.
    pub async fn matching(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        self.storage.select(criteria).await
    }

    /// Returns the aggregate identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no aggregate matches.
    #[instrument(skip(self), fields(aggregate = A::TYPE_NAME))]
    pub async fn get(&self, id: Identifier) -> Result<A, DomainError> {
        self.storage
            .select(&Criteria::new().filter(by_id(id)))
            .await?
            .into_elements()
            .into_iter()
            .next()
            .ok_or(DomainError::AggregateNotFound(id))
    }

    /// Inserts the aggregate, or updates it if storage already holds it.
    ///
    /// # Errors
    ///
    /// Propagates storage errors, including
    /// `DomainError::OptimisticLockConflict` from event-sourced backends.
    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME, id = %aggregate.id()))]
    pub async fn add(&self, aggregate: &mut A) -> Result<(), DomainError> {
        if self.contains(aggregate).await? {
            debug!("updating existing aggregate");
            self.storage.update(aggregate).await
        } else {
            debug!("inserting new aggregate");
            self.storage.insert(aggregate).await
        }
    }

    /// Removes the aggregate.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME, id = %aggregate.id()))]
    pub async fn remove(&self, aggregate: &A) -> Result<Collection<A>, DomainError> {
        self.storage
            .delete(&Criteria::new().filter(by_id(aggregate.id())))
            .await
    }

    /// Returns `true` if storage holds an aggregate with the same identifier.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn contains(&self, aggregate: &A) -> Result<bool, DomainError> {
        let found = self
            .storage
            .count(&Criteria::new().filter(by_id(aggregate.id())))
            .await?;
        Ok(found > 0)
    }

    /// Counts the aggregates matching `criteria`, ignoring its slice.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError> {
        self.storage.count(criteria).await
    }

    /// Returns one page of the aggregates matching `criteria`, with the total
    /// match count and the slice in its metadata.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn page(&self, criteria: &Criteria) -> Result<Page<A>, DomainError> {
        let total = self.storage.count(criteria).await?;
        let mut collection = self
            .storage
            .select(criteria)
            .await?
            .with_meta("total", total)
            .with_meta("offset", criteria.offset().unwrap_or(0));
        if let Some(limit) = criteria.limit() {
            collection = collection.with_meta("limit", limit);
        }
        collection.morph()
    }
}
