//! In-process storage of aggregate state.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use chronicle_core::aggregate::AggregateRoot;
use chronicle_core::collection::Collection;
use chronicle_core::criteria::Criteria;
use chronicle_core::error::DomainError;
use chronicle_core::identifier::Identifier;
use chronicle_core::normalize::TaggedMap;
use chronicle_core::storage::Storage;

type Rows = Vec<(Identifier, TaggedMap)>;

/// Storage holding each aggregate's normalized state, keyed by type name
/// then by identifier, in insertion order.
///
/// One instance can serve several aggregate types. Aggregates are stored as
/// tagged maps, so a stored value never aliases the caller's aggregate.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<&'static str, Rows>>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of aggregates stored under `type_name`.
    pub async fn len_of(&self, type_name: &str) -> usize {
        self.data.read().await.get(type_name).map_or(0, Vec::len)
    }

    async fn load<A: AggregateRoot>(&self) -> Result<Collection<A>, DomainError> {
        let data = self.data.read().await;
        data.get(A::TYPE_NAME)
            .map(|rows| rows.iter().map(|(_, state)| A::denormalize(state)).collect())
            .unwrap_or_else(|| Ok(Collection::default()))
    }
}

#[async_trait]
impl<A: AggregateRoot> Storage<A> for InMemoryStorage {
    async fn select(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        self.load::<A>().await?.matching(criteria)
    }

    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME, id = %aggregate.id()))]
    async fn insert(&self, aggregate: &mut A) -> Result<(), DomainError> {
        let id = aggregate.id();
        let state = aggregate.normalize();
        {
            let mut data = self.data.write().await;
            let rows = data.entry(A::TYPE_NAME).or_default();
            match rows.iter_mut().find(|(stored, _)| *stored == id) {
                Some(row) => row.1 = state,
                None => rows.push((id, state)),
            }
        }
        let flushed = aggregate.pull_events().len();
        debug!(flushed, "stored aggregate state");
        Ok(())
    }

    #[instrument(skip_all, fields(aggregate = A::TYPE_NAME))]
    async fn delete(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        let doomed = <Self as Storage<A>>::select(self, criteria).await?;
        let ids: Vec<Identifier> = doomed.iter().map(|aggregate| aggregate.id()).collect();
        if let Some(rows) = self.data.write().await.get_mut(A::TYPE_NAME) {
            rows.retain(|(id, _)| !ids.contains(id));
        }
        debug!(deleted = ids.len(), "deleted aggregates");
        Ok(doomed)
    }

    async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError> {
        let unsliced = criteria.clone().without_slice();
        Ok(<Self as Storage<A>>::select(self, &unsliced).await?.len())
    }
}
