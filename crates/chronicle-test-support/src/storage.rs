//! Test storages: `Storage` doubles for error paths and call recording.

use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_core::aggregate::AggregateRoot;
use chronicle_core::collection::Collection;
use chronicle_core::criteria::Criteria;
use chronicle_core::error::DomainError;
use chronicle_core::identifier::Identifier;
use chronicle_core::storage::Storage;

/// A storage that always returns an infrastructure error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingStorage;

fn refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl<A: AggregateRoot> Storage<A> for FailingStorage {
    async fn select(&self, _criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        Err(refused())
    }

    async fn insert(&self, _aggregate: &mut A) -> Result<(), DomainError> {
        Err(refused())
    }

    async fn delete(&self, _criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        Err(refused())
    }

    async fn count(&self, _criteria: &Criteria) -> Result<usize, DomainError> {
        Err(refused())
    }
}

/// Storage call, as seen by [`RecordingStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum StorageCall {
    /// `select` with the given criteria.
    Select(Criteria),
    /// `insert` of the given aggregate.
    Insert(Identifier),
    /// `update` of the given aggregate.
    Update(Identifier),
    /// `delete` with the given criteria.
    Delete(Criteria),
    /// `count` with the given criteria.
    Count(Criteria),
}

/// A storage that records every call, answers `count` with a configured
/// value and `select`/`delete` with an empty collection.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    count: usize,
    calls: Mutex<Vec<StorageCall>>,
}

impl RecordingStorage {
    /// Creates a recording storage whose `count` always returns `count`.
    #[must_use]
    pub fn with_count(count: usize) -> Self {
        Self {
            count,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all recorded calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StorageCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<A: AggregateRoot> Storage<A> for RecordingStorage {
    async fn select(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        self.record(StorageCall::Select(criteria.clone()));
        Ok(Collection::default())
    }

    async fn insert(&self, aggregate: &mut A) -> Result<(), DomainError> {
        self.record(StorageCall::Insert(aggregate.id()));
        aggregate.pull_events();
        Ok(())
    }

    async fn update(&self, aggregate: &mut A) -> Result<(), DomainError> {
        self.record(StorageCall::Update(aggregate.id()));
        aggregate.pull_events();
        Ok(())
    }

    async fn delete(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        self.record(StorageCall::Delete(criteria.clone()));
        Ok(Collection::default())
    }

    async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError> {
        self.record(StorageCall::Count(criteria.clone()));
        Ok(self.count)
    }
}
