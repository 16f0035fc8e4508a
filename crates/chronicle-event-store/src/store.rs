//! Event-sourced storage: aggregates persist as their events and are read
//! back by replay.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chronicle_core::aggregate::AggregateRoot;
use chronicle_core::collection::Collection;
use chronicle_core::criteria::Criteria;
use chronicle_core::error::DomainError;
use chronicle_core::event::{Event, EventRecord};
use chronicle_core::expression::{Comparison, Expression, Logical, LogicalType, Operator};
use chronicle_core::identifier::Identifier;
use chronicle_core::storage::Storage;

use crate::log::EventLog;

/// Interval between two polls of [`EventStore::wait_for`].
pub const WAIT_TICK: Duration = Duration::from_millis(10);

/// Storage that appends aggregates' pending events to an [`EventLog`] and
/// rebuilds aggregates by replaying their history.
///
/// Writes are checked optimistically: a batch whose last event predates the
/// emitter's most recent stored event is rejected with
/// `DomainError::OptimisticLockConflict`. Callers re-read and retry; the
/// store never retries on its own.
#[derive(Debug, Clone, Default)]
pub struct EventStore<L> {
    log: L,
}

impl<L: EventLog> EventStore<L> {
    /// Creates a store over `log`.
    pub fn new(log: L) -> Self {
        Self { log }
    }

    /// Returns the underlying log.
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Replaces every stored event named `old_name` with the record
    /// `migrate` produces from it.
    ///
    /// Every record is migrated before anything is written. The removal of
    /// the old batch and the insertion of the new one are two separate
    /// writes. Returns the number of upgraded events.
    ///
    /// # Errors
    ///
    /// Propagates errors from `migrate` and from the log.
    #[instrument(skip(self, migrate))]
    pub async fn upgrade_event<F>(&self, old_name: &str, migrate: F) -> Result<usize, DomainError>
    where
        F: Fn(&EventRecord) -> Result<EventRecord, DomainError> + Send + Sync,
    {
        let deprecated = self.log.by_name(old_name).await?;
        if deprecated.is_empty() {
            debug!("no event to upgrade");
            return Ok(0);
        }
        let upgraded = deprecated
            .iter()
            .map(&migrate)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = deprecated.iter().map(|record| record.id).collect();

        self.log.remove_events(&ids).await?;
        self.log.insert_events(upgraded).await?;
        info!(count = ids.len(), "upgraded deprecated events");
        Ok(ids.len())
    }

    /// Polls the log until an event named `name` exists and returns the
    /// earliest one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Timeout` if no such event appears within
    /// `timeout`, and propagates log errors.
    #[instrument(skip(self))]
    pub async fn wait_for(&self, name: &str, timeout: Duration) -> Result<EventRecord, DomainError> {
        let deadline = Instant::now() + timeout;
        let mut ticker = interval(WAIT_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(record) = self.log.by_name(name).await?.into_iter().next() {
                return Ok(record);
            }
            if Instant::now() >= deadline {
                return Err(DomainError::Timeout(format!(
                    "no `{name}` event recorded within {timeout:?}"
                )));
            }
        }
    }

    async fn replay<A: AggregateRoot>(&self, emitter_ids: &[Identifier]) -> Result<Vec<A>, DomainError> {
        if emitter_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.log.load(A::TYPE_NAME, emitter_ids).await?;
        debug!(events = records.len(), emitters = emitter_ids.len(), "replaying history");

        let mut histories: HashMap<Identifier, Vec<Event<A::Event>>> = HashMap::new();
        for record in &records {
            histories
                .entry(record.emitter_id)
                .or_default()
                .push(Event::from_record(record)?);
        }
        emitter_ids
            .iter()
            .filter_map(|id| histories.remove(id))
            .map(A::rebuild_from_events)
            .collect()
    }
}

fn is_id_field(field: &str) -> bool {
    matches!(field, "id" | "id.uuid")
}

fn ids_in(comparison: &Comparison) -> Option<Vec<Identifier>> {
    if !is_id_field(&comparison.field) {
        return None;
    }
    let candidates: Vec<&Value> = match comparison.operator {
        Operator::Eq => vec![&comparison.value],
        Operator::In => match &comparison.value {
            Value::Array(values) => values.iter().collect(),
            single => vec![single],
        },
        _ => return None,
    };
    let mut ids = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let id = Identifier::from_value(candidate)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Some(ids)
}

/// Extracts the identifiers an expression restricts to, from an `eq`/`in`
/// comparison on the identifier either at the root or directly under a
/// conjunction.
fn emitter_scope(expression: Option<&Expression>) -> Option<Vec<Identifier>> {
    match expression?.canonicalize().ok()? {
        Expression::Comparison(comparison) => ids_in(&comparison),
        Expression::Logical(Logical {
            kind: LogicalType::And,
            expressions,
        }) => expressions.iter().find_map(|expression| match expression {
            Expression::Comparison(comparison) => ids_in(comparison),
            _ => None,
        }),
        _ => None,
    }
}

#[async_trait]
impl<A, L> Storage<A> for EventStore<L>
where
    A: AggregateRoot,
    L: EventLog,
{
    #[instrument(skip_all, fields(emitter_type = A::TYPE_NAME))]
    async fn select(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        let emitter_ids = match emitter_scope(criteria.expression()) {
            Some(ids) => ids,
            None => self.log.emitter_ids(A::TYPE_NAME).await?,
        };
        let aggregates: Collection<A> = self.replay(&emitter_ids).await?.into_iter().collect();
        aggregates.matching(criteria)
    }

    #[instrument(skip_all, fields(emitter_type = A::TYPE_NAME, emitter_id = %aggregate.id()))]
    async fn insert(&self, aggregate: &mut A) -> Result<(), DomainError> {
        if aggregate.pending_events().is_empty() {
            debug!("no pending events");
            return Ok(());
        }
        let emitter_id = aggregate.id();
        let records = aggregate
            .pending_events()
            .iter()
            .map(Event::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let count = records.len();

        match self.log.append(emitter_id, records).await {
            Ok(()) => {
                aggregate.pull_events();
                debug!(count, "appended events");
                Ok(())
            }
            Err(err @ DomainError::OptimisticLockConflict { .. }) => {
                warn!(error = %err, "stale write rejected");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(emitter_type = A::TYPE_NAME))]
    async fn delete(&self, criteria: &Criteria) -> Result<Collection<A>, DomainError> {
        let doomed = <Self as Storage<A>>::select(self, criteria).await?;
        if doomed.is_empty() {
            return Ok(doomed);
        }
        let ids: Vec<Identifier> = doomed.iter().map(|aggregate| aggregate.id()).collect();
        let erased = self.log.erase(&ids).await?;
        warn!(
            aggregates = ids.len(),
            events = erased,
            "erased event history; deleted aggregates cannot be rebuilt"
        );
        Ok(doomed)
    }

    #[instrument(skip_all, fields(emitter_type = A::TYPE_NAME))]
    async fn count(&self, criteria: &Criteria) -> Result<usize, DomainError> {
        if criteria.expression().is_none() {
            return Ok(self.log.emitter_ids(A::TYPE_NAME).await?.len());
        }
        let unsliced = criteria.clone().without_slice();
        Ok(<Self as Storage<A>>::select(self, &unsliced).await?.len())
    }
}
