//! Storage contract implemented by every backend.

use async_trait::async_trait;

use crate::aggregate::AggregateRoot;
use crate::collection::Collection;
use crate::criteria::Criteria;
use crate::error::DomainError;

/// Persistence backend for one aggregate type.
///
/// Every implementation honors the same filtering, ordering and slicing
/// semantics, so swapping backends never changes which aggregates a
/// criteria selects, nor their order.
#[async_trait]
pub trait Storage<A: AggregateRoot>: Send + Sync {
    /// Returns the aggregates matching `criteria`.
    async fn select(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError>;

    /// Persists a new aggregate and drains its pending events.
    async fn insert(&self, aggregate: &mut A) -> Result<(), DomainError>;

    /// Persists changes to an existing aggregate and drains its pending
    /// events.
    async fn update(&self, aggregate: &mut A) -> Result<(), DomainError> {
        self.insert(aggregate).await
    }

    /// Removes the aggregates matching `criteria` and returns them.
    async fn delete(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError>;

    /// Counts the aggregates matching `criteria`, ignoring its slice.
    async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError>;
}
