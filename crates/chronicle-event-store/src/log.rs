//! Append-only event log abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use chronicle_core::datetime::Datetime;
use chronicle_core::error::DomainError;
use chronicle_core::event::EventRecord;
use chronicle_core::identifier::Identifier;

/// Relational-log primitive the event store is built on.
///
/// Reads return records ordered by `record_date`, ties broken by insertion
/// order.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends the records of one emitter as an atomic batch, after checking
    /// that no stored event of that emitter is more recent than the last
    /// record being appended.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::OptimisticLockConflict` if the stored history
    /// moved past the batch.
    async fn append(&self, emitter_id: Identifier, records: Vec<EventRecord>) -> Result<(), DomainError>;

    /// Returns every distinct emitter of `emitter_type`, in order of first
    /// appearance.
    async fn emitter_ids(&self, emitter_type: &str) -> Result<Vec<Identifier>, DomainError>;

    /// Returns the records of `emitter_type` raised by any of `emitter_ids`.
    async fn load(&self, emitter_type: &str, emitter_ids: &[Identifier]) -> Result<Vec<EventRecord>, DomainError>;

    /// Removes every record of the given emitters. Returns the number of
    /// records removed.
    async fn erase(&self, emitter_ids: &[Identifier]) -> Result<u64, DomainError>;

    /// Returns every record named `name`.
    async fn by_name(&self, name: &str) -> Result<Vec<EventRecord>, DomainError>;

    /// Removes records by event id. Returns the number of records removed.
    async fn remove_events(&self, ids: &[Uuid]) -> Result<u64, DomainError>;

    /// Appends records without any concurrency check.
    async fn insert_events(&self, records: Vec<EventRecord>) -> Result<(), DomainError>;
}

/// Rejects a write whose last event predates the emitter's stored history.
///
/// # Errors
///
/// Returns `DomainError::OptimisticLockConflict` if `last_recorded` is after
/// `attempted`.
pub fn check_horizon(
    emitter_id: Identifier,
    last_recorded: Option<Datetime>,
    attempted: Datetime,
) -> Result<(), DomainError> {
    match last_recorded {
        Some(last_recorded) if last_recorded > attempted => Err(DomainError::OptimisticLockConflict {
            emitter_id,
            last_recorded,
            attempted,
        }),
        _ => Ok(()),
    }
}

/// Returns the timestamp of the last record of a batch.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the batch is empty or mixes
/// emitters.
pub fn batch_horizon(emitter_id: Identifier, records: &[EventRecord]) -> Result<Datetime, DomainError> {
    if let Some(stray) = records.iter().find(|r| r.emitter_id != emitter_id) {
        return Err(DomainError::Validation(format!(
            "event {} belongs to emitter {}, not {emitter_id}",
            stray.id, stray.emitter_id
        )));
    }
    records
        .iter()
        .map(|r| r.record_date)
        .next_back()
        .ok_or_else(|| DomainError::Validation(format!("empty batch for emitter {emitter_id}")))
}
