//! Aggregate root abstraction.

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::{Event, EventPayload};
use crate::expression::{Expression, eq};
use crate::identifier::{Identifier, Identity};
use crate::normalize::Normalizable;

/// Dot-path of an aggregate's identifier in its normalized form.
pub const ID_FIELD: &str = "id.uuid";

/// Builds the criteria expression selecting the aggregate identified by `id`.
#[must_use]
pub fn by_id(id: Identifier) -> Expression {
    eq(ID_FIELD, id.to_string())
}

/// Trait for event-sourced aggregate roots.
///
/// State only changes through [`AggregateRoot::apply`], so an aggregate is
/// always the fold of `apply` over its history, starting from
/// [`AggregateRoot::new_empty_for_replay`]. The normalized form must expose
/// the identity under the `id` key.
pub trait AggregateRoot: Normalizable + Clone + Send + Sync + 'static {
    /// The event payload family this aggregate raises and applies.
    type Event: EventPayload;

    /// Returns the identity cell of the aggregate.
    fn identity(&self) -> &Identity;

    /// Returns the aggregate identifier, generating it on first access.
    fn id(&self) -> Identifier {
        self.identity().get()
    }

    /// Allocates a zero-value instance for replay, skipping the invariants
    /// normal construction establishes. Its identity must be unassigned.
    fn new_empty_for_replay() -> Self;

    /// Applies an event to mutate internal state. Events this aggregate does
    /// not react to are ignored.
    fn apply(&mut self, event: &Event<Self::Event>);

    /// Returns events raised since the last flush.
    fn pending_events(&self) -> &[Event<Self::Event>];

    /// Mutable access to the pending stream.
    fn pending_events_mut(&mut self) -> &mut Vec<Event<Self::Event>>;

    /// Stamps `event` with this aggregate as emitter, applies it and queues
    /// it for persistence.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::IdentifierImmutable` if the event was already
    /// stamped by another emitter.
    fn raise_event(&mut self, mut event: Event<Self::Event>) -> Result<(), DomainError> {
        event.assign_emitter(self.id(), Self::TYPE_NAME)?;
        self.apply(&event);
        self.pending_events_mut().push(event);
        Ok(())
    }

    /// Creates an event from `payload` at the clock's current time and
    /// raises it.
    ///
    /// # Errors
    ///
    /// See [`AggregateRoot::raise_event`].
    fn raise(&mut self, payload: Self::Event, clock: &dyn Clock) -> Result<(), DomainError> {
        self.raise_event(Event::new(payload, clock))
    }

    /// Returns and clears the pending stream.
    fn pull_events(&mut self) -> Vec<Event<Self::Event>> {
        std::mem::take(self.pending_events_mut())
    }

    /// Rebuilds an aggregate by replaying `events` in timestamp order.
    ///
    /// Events sharing a timestamp keep their relative order. The identity is
    /// taken from the first event's emitter.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::IdentifierImmutable` if the history mixes
    /// emitters.
    fn rebuild_from_events(mut events: Vec<Event<Self::Event>>) -> Result<Self, DomainError> {
        events.sort_by_key(Event::recorded_at);
        let mut aggregate = Self::new_empty_for_replay();
        if let Some(emitter) = events.first().and_then(Event::emitter_id) {
            aggregate.identity().assign(emitter)?;
        }
        for event in &events {
            match event.emitter_id() {
                Some(emitter) if emitter != aggregate.id() => {
                    return Err(DomainError::IdentifierImmutable(aggregate.id()));
                }
                _ => aggregate.apply(event),
            }
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::datetime::Datetime;
    use crate::normalize::{Registry, TaggedMap};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Opened {
        owner: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Deposited {
        amount: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Audited {
        note: String,
    }

    crate::normalizable!(Opened, "opened");
    crate::normalizable!(Deposited, "deposited");
    crate::normalizable!(Audited, "audited");

    #[derive(Debug, Clone, PartialEq)]
    enum AccountEvent {
        Opened(Opened),
        Deposited(Deposited),
        Audited(Audited),
    }

    impl Normalizable for AccountEvent {
        const TYPE_NAME: &'static str = "account_event";

        fn normalize(&self) -> TaggedMap {
            match self {
                Self::Opened(e) => e.normalize(),
                Self::Deposited(e) => e.normalize(),
                Self::Audited(e) => e.normalize(),
            }
        }

        fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
            Registry::new()
                .register(Self::Opened)
                .register(Self::Deposited)
                .register(Self::Audited)
                .denormalize(data)
        }
    }

    impl EventPayload for AccountEvent {
        fn name(&self) -> &'static str {
            match self {
                Self::Opened(_) => Opened::TYPE_NAME,
                Self::Deposited(_) => Deposited::TYPE_NAME,
                Self::Audited(_) => Audited::TYPE_NAME,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: Identity,
        owner: String,
        balance: i64,
        #[serde(skip)]
        pending: Vec<Event<AccountEvent>>,
    }

    crate::normalizable!(Account, "account");

    impl Account {
        fn open(owner: &str, clock: &dyn Clock) -> Result<Self, DomainError> {
            let mut account = Self::new_empty_for_replay();
            account.raise(
                AccountEvent::Opened(Opened {
                    owner: owner.to_owned(),
                }),
                clock,
            )?;
            Ok(account)
        }
    }

    impl AggregateRoot for Account {
        type Event = AccountEvent;

        fn identity(&self) -> &Identity {
            &self.id
        }

        fn new_empty_for_replay() -> Self {
            Self {
                id: Identity::new(),
                owner: String::new(),
                balance: 0,
                pending: Vec::new(),
            }
        }

        fn apply(&mut self, event: &Event<AccountEvent>) {
            match event.payload() {
                AccountEvent::Opened(e) => e.owner.clone_into(&mut self.owner),
                AccountEvent::Deposited(e) => self.balance += e.amount,
                AccountEvent::Audited(_) => {}
            }
        }

        fn pending_events(&self) -> &[Event<AccountEvent>] {
            &self.pending
        }

        fn pending_events_mut(&mut self) -> &mut Vec<Event<AccountEvent>> {
            &mut self.pending
        }
    }

    struct At(i64);

    impl Clock for At {
        fn now(&self) -> Datetime {
            Datetime::from(Utc.timestamp_opt(1_768_471_200 + self.0, 0).unwrap())
        }
    }

    fn deposit(amount: i64) -> AccountEvent {
        AccountEvent::Deposited(Deposited { amount })
    }

    #[test]
    fn test_raise_applies_immediately_and_queues() {
        // Arrange
        let mut account = Account::open("ada", &At(0)).unwrap();

        // Act
        account.raise(deposit(50), &At(1)).unwrap();

        // Assert
        assert_eq!(account.balance, 50);
        assert_eq!(account.pending_events().len(), 2);
        assert!(account.pending_events().iter().all(|e| e.emitter_id() == Some(account.id())));
    }

    #[test]
    fn test_raise_rejects_event_from_other_emitter() {
        let mut account = Account::open("ada", &At(0)).unwrap();
        let mut foreign = Event::new(deposit(5), &At(1));
        foreign.assign_emitter(Identifier::generate(), "account").unwrap();

        let result = account.raise_event(foreign);

        assert!(matches!(result, Err(DomainError::IdentifierImmutable(_))));
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn test_pull_events_drains_exactly_once() {
        let mut account = Account::open("ada", &At(0)).unwrap();

        let first = account.pull_events();
        let second = account.pull_events();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_rebuild_replays_in_timestamp_order() {
        // Arrange
        let mut account = Account::open("ada", &At(0)).unwrap();
        account.raise(deposit(10), &At(2)).unwrap();
        account.raise(deposit(5), &At(1)).unwrap();
        let mut history = account.pull_events();
        history.reverse();

        // Act
        let rebuilt = Account::rebuild_from_events(history).unwrap();

        // Assert
        assert_eq!(rebuilt.id(), account.id());
        assert_eq!(rebuilt.owner, "ada");
        assert_eq!(rebuilt.balance, 15);
        assert!(rebuilt.pending_events().is_empty());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let mut account = Account::open("ada", &At(0)).unwrap();
        account.raise(deposit(10), &At(1)).unwrap();
        account
            .raise(AccountEvent::Audited(Audited { note: "ok".to_owned() }), &At(2))
            .unwrap();
        let history = account.pull_events();

        let first = Account::rebuild_from_events(history.clone()).unwrap();
        let second = Account::rebuild_from_events(history).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.normalize(), account.normalize());
    }

    #[test]
    fn test_rebuild_rejects_mixed_emitters() {
        let mut a = Account::open("ada", &At(0)).unwrap();
        let mut b = Account::open("bob", &At(1)).unwrap();
        let mut history = a.pull_events();
        history.extend(b.pull_events());

        let result = Account::rebuild_from_events(history);

        assert!(matches!(result, Err(DomainError::IdentifierImmutable(_))));
    }

    #[test]
    fn test_normalized_aggregate_exposes_id_path() {
        let account = Account::open("ada", &At(0)).unwrap();

        let ids = account.query(ID_FIELD);

        assert_eq!(ids, vec![serde_json::json!(account.id().to_string())]);
        let restored = Account::denormalize(&account.normalize()).unwrap();
        assert_eq!(restored.id(), account.id());
        assert_eq!(restored.balance, account.balance);
    }
}
