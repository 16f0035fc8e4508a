//! In-process implementation of the `EventLog` trait.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use chronicle_core::error::DomainError;
use chronicle_core::event::EventRecord;
use chronicle_core::identifier::Identifier;

use crate::log::{EventLog, batch_horizon, check_horizon};

/// Event log held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every record, in insertion order.
    pub async fn records(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }
}

fn chronological(mut records: Vec<EventRecord>) -> Vec<EventRecord> {
    records.sort_by_key(|r| r.record_date);
    records
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, emitter_id: Identifier, records: Vec<EventRecord>) -> Result<(), DomainError> {
        let attempted = batch_horizon(emitter_id, &records)?;
        let mut stored = self.records.write().await;
        let last_recorded = stored
            .iter()
            .filter(|r| r.emitter_id == emitter_id)
            .map(|r| r.record_date)
            .max();
        check_horizon(emitter_id, last_recorded, attempted)?;
        stored.extend(records);
        Ok(())
    }

    async fn emitter_ids(&self, emitter_type: &str) -> Result<Vec<Identifier>, DomainError> {
        let stored = self.records.read().await;
        let mut ids: Vec<Identifier> = Vec::new();
        for record in stored.iter().filter(|r| r.emitter_class_name == emitter_type) {
            if !ids.contains(&record.emitter_id) {
                ids.push(record.emitter_id);
            }
        }
        Ok(ids)
    }

    async fn load(&self, emitter_type: &str, emitter_ids: &[Identifier]) -> Result<Vec<EventRecord>, DomainError> {
        let stored = self.records.read().await;
        Ok(chronological(
            stored
                .iter()
                .filter(|r| r.emitter_class_name == emitter_type && emitter_ids.contains(&r.emitter_id))
                .cloned()
                .collect(),
        ))
    }

    async fn erase(&self, emitter_ids: &[Identifier]) -> Result<u64, DomainError> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|r| !emitter_ids.contains(&r.emitter_id));
        Ok(u64::try_from(before - stored.len()).unwrap_or(u64::MAX))
    }

    async fn by_name(&self, name: &str) -> Result<Vec<EventRecord>, DomainError> {
        let stored = self.records.read().await;
        Ok(chronological(
            stored.iter().filter(|r| r.name == name).cloned().collect(),
        ))
    }

    async fn remove_events(&self, ids: &[Uuid]) -> Result<u64, DomainError> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|r| !ids.contains(&r.id));
        Ok(u64::try_from(before - stored.len()).unwrap_or(u64::MAX))
    }

    async fn insert_events(&self, records: Vec<EventRecord>) -> Result<(), DomainError> {
        self.records.write().await.extend(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::Map;

    use super::*;
    use chronicle_core::datetime::Datetime;

    fn at(seconds: i64) -> Datetime {
        Datetime::from(Utc.timestamp_opt(1_768_471_200, 0).unwrap() + TimeDelta::seconds(seconds))
    }

    fn record(emitter_id: Identifier, name: &str, seconds: i64) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            record_date: at(seconds),
            name: name.to_owned(),
            emitter_id,
            emitter_class_name: "member".to_owned(),
            payload: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_append_rejects_stale_batch() {
        // Arrange
        let log = MemoryEventLog::new();
        let emitter = Identifier::generate();
        log.append(emitter, vec![record(emitter, "a", 10)]).await.unwrap();

        // Act
        let stale = log.append(emitter, vec![record(emitter, "b", 5)]).await;
        let fresh = log.append(emitter, vec![record(emitter, "c", 11)]).await;

        // Assert
        match stale {
            Err(DomainError::OptimisticLockConflict {
                emitter_id,
                last_recorded,
                attempted,
            }) => {
                assert_eq!(emitter_id, emitter);
                assert_eq!(last_recorded, at(10));
                assert_eq!(attempted, at(5));
            }
            other => panic!("expected OptimisticLockConflict, got {other:?}"),
        }
        assert!(fresh.is_ok());
        assert_eq!(log.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_append_accepts_equal_timestamp() {
        let log = MemoryEventLog::new();
        let emitter = Identifier::generate();
        log.append(emitter, vec![record(emitter, "a", 10)]).await.unwrap();

        let result = log.append(emitter, vec![record(emitter, "b", 10)]).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_append_rejects_foreign_record() {
        let log = MemoryEventLog::new();
        let emitter = Identifier::generate();

        let result = log
            .append(emitter, vec![record(Identifier::generate(), "a", 1)])
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_load_orders_by_date_then_insertion() {
        let log = MemoryEventLog::new();
        let emitter = Identifier::generate();
        log.insert_events(vec![
            record(emitter, "late", 9),
            record(emitter, "tie-1", 3),
            record(emitter, "tie-2", 3),
        ])
        .await
        .unwrap();

        let names: Vec<String> = log
            .load("member", &[emitter])
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, vec!["tie-1", "tie-2", "late"]);
    }

    #[tokio::test]
    async fn test_emitter_ids_in_first_appearance_order() {
        let log = MemoryEventLog::new();
        let (a, b) = (Identifier::generate(), Identifier::generate());
        let mut other_type = record(Identifier::generate(), "x", 0);
        other_type.emitter_class_name = "invoice".to_owned();
        log.insert_events(vec![record(b, "x", 0), record(a, "x", 1), record(b, "y", 2), other_type])
            .await
            .unwrap();

        assert_eq!(log.emitter_ids("member").await.unwrap(), vec![b, a]);
    }

    #[tokio::test]
    async fn test_erase_and_remove_events() {
        let log = MemoryEventLog::new();
        let (a, b) = (Identifier::generate(), Identifier::generate());
        let kept = record(b, "y", 1);
        let dropped = record(b, "z", 2);
        log.insert_events(vec![record(a, "x", 0), kept.clone(), dropped.clone()])
            .await
            .unwrap();

        assert_eq!(log.erase(&[a]).await.unwrap(), 1);
        assert_eq!(log.remove_events(&[dropped.id]).await.unwrap(), 1);
        assert_eq!(log.records().await, vec![kept.clone()]);
        assert_eq!(log.load("member", &[b]).await.unwrap(), vec![kept]);
    }
}
