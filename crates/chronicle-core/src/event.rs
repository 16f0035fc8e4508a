//! Domain event abstractions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::Clock;
use crate::datetime::Datetime;
use crate::error::DomainError;
use crate::identifier::Identifier;
use crate::normalize::{Normalizable, TYPE_KEY, TaggedMap, expect_type};

/// Payload of a domain event: the event's own fields.
///
/// Aggregates usually declare a closed enum of payloads and implement this
/// trait by delegating to the variants, with a [`Registry`] for decoding.
///
/// [`Registry`]: crate::normalize::Registry
pub trait EventPayload: Normalizable + Clone + fmt::Debug + Send + Sync + 'static {
    /// Returns the event name recorded in storage.
    fn name(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    event_id: Uuid,
    emitter_id: Option<Identifier>,
    emitter_type: String,
    recorded_at: Datetime,
}

impl EventMetadata {
    /// Unique event identifier.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Identifier of the aggregate that raised the event, once assigned.
    #[must_use]
    pub fn emitter_id(&self) -> Option<Identifier> {
        self.emitter_id
    }

    /// Type name of the emitting aggregate. Empty until assigned.
    #[must_use]
    pub fn emitter_type(&self) -> &str {
        &self.emitter_type
    }

    /// Timestamp of event creation.
    #[must_use]
    pub fn recorded_at(&self) -> Datetime {
        self.recorded_at
    }
}

/// An immutable fact raised by an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    metadata: EventMetadata,
    payload: P,
}

impl<P: EventPayload> Event<P> {
    /// Creates an event stamped with the clock's current time and no emitter.
    pub fn new(payload: P, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                emitter_id: None,
                emitter_type: String::new(),
                recorded_at: clock.now(),
            },
            payload,
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    /// Shorthand for `metadata().emitter_id()`.
    #[must_use]
    pub fn emitter_id(&self) -> Option<Identifier> {
        self.metadata.emitter_id
    }

    /// Shorthand for `metadata().recorded_at()`.
    #[must_use]
    pub fn recorded_at(&self) -> Datetime {
        self.metadata.recorded_at
    }

    /// Stamps the event with its emitter.
    ///
    /// Stamping again with the same emitter is accepted.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::IdentifierImmutable` if the event already has a
    /// different emitter.
    pub fn assign_emitter(&mut self, emitter_id: Identifier, emitter_type: &str) -> Result<(), DomainError> {
        match self.metadata.emitter_id {
            Some(existing) if existing != emitter_id => Err(DomainError::IdentifierImmutable(existing)),
            _ => {
                self.metadata.emitter_id = Some(emitter_id);
                emitter_type.clone_into(&mut self.metadata.emitter_type);
                Ok(())
            }
        }
    }

    /// Converts the event into its persisted record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no emitter was assigned.
    pub fn to_record(&self) -> Result<EventRecord, DomainError> {
        let emitter_id = self.metadata.emitter_id.ok_or_else(|| {
            DomainError::Validation(format!("event {} has no emitter", self.metadata.event_id))
        })?;
        Ok(EventRecord {
            id: self.metadata.event_id,
            record_date: self.metadata.recorded_at,
            name: self.name().to_owned(),
            emitter_id,
            emitter_class_name: self.metadata.emitter_type.clone(),
            payload: self.payload.normalize(),
        })
    }

    /// Rebuilds an event from its persisted record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if the payload cannot be decoded.
    pub fn from_record(record: &EventRecord) -> Result<Self, DomainError> {
        let payload = P::denormalize(&record.payload).map_err(|e| {
            DomainError::PayloadDecode(format!("event {} ({}): {e}", record.id, record.name))
        })?;
        Ok(Self {
            metadata: EventMetadata {
                event_id: record.id,
                emitter_id: Some(record.emitter_id),
                emitter_type: record.emitter_class_name.clone(),
                recorded_at: record.record_date,
            },
            payload,
        })
    }
}

impl<P: EventPayload> Normalizable for Event<P> {
    const TYPE_NAME: &'static str = "event";

    fn normalize(&self) -> TaggedMap {
        let mut map = TaggedMap::new();
        map.insert("id".to_owned(), Value::String(self.metadata.event_id.to_string()));
        map.insert(
            "record_date".to_owned(),
            Value::Object(self.metadata.recorded_at.normalize()),
        );
        map.insert("name".to_owned(), Value::String(self.name().to_owned()));
        map.insert(
            "emitter_id".to_owned(),
            self.metadata
                .emitter_id
                .map_or(Value::Null, |id| Value::Object(id.normalize())),
        );
        map.insert(
            "emitter_class_name".to_owned(),
            Value::String(self.metadata.emitter_type.clone()),
        );
        map.insert("payload".to_owned(), Value::Object(self.payload.normalize()));
        map.insert(TYPE_KEY.to_owned(), Value::String(Self::TYPE_NAME.to_owned()));
        map
    }

    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
        expect_type(data, Self::TYPE_NAME)?;
        let field = |key: &str| {
            data.get(key)
                .ok_or_else(|| DomainError::PayloadDecode(format!("event without `{key}`")))
        };
        let tagged = |key: &str| match field(key)? {
            Value::Object(map) => Ok(map),
            _ => Err(DomainError::PayloadDecode(format!("event `{key}` is not a tagged map"))),
        };
        let event_id = field("id")?
            .as_str()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| DomainError::PayloadDecode("event id is not a UUID".to_owned()))?;
        let emitter_id = match field("emitter_id")? {
            Value::Null => None,
            value => Some(Identifier::from_value(value).ok_or_else(|| {
                DomainError::PayloadDecode("event emitter_id is not an identifier".to_owned())
            })?),
        };
        Ok(Self {
            metadata: EventMetadata {
                event_id,
                emitter_id,
                emitter_type: field("emitter_class_name")?.as_str().unwrap_or_default().to_owned(),
                recorded_at: Datetime::denormalize(tagged("record_date")?)?,
            },
            payload: P::denormalize(tagged("payload")?)?,
        })
    }
}

/// Persisted shape of an event.
///
/// Serializes to
/// `{id, record_date, name, emitter_id, emitter_class_name, payload}` with the
/// timestamp as ISO-8601 text (microseconds) and the emitter as a bare UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub id: Uuid,
    /// Creation timestamp of the event.
    #[serde(with = "iso8601")]
    pub record_date: Datetime,
    /// Event name, used to route decoding and upgrades.
    pub name: String,
    /// Identifier of the emitting aggregate.
    #[serde(with = "bare_uuid")]
    pub emitter_id: Identifier,
    /// Type name of the emitting aggregate.
    pub emitter_class_name: String,
    /// Tagged map of the event payload.
    pub payload: TaggedMap,
}

mod iso8601 {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::datetime::Datetime;

    pub(super) fn serialize<S: Serializer>(value: &Datetime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_iso8601())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Datetime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Datetime::parse(&raw).map_err(D::Error::custom)
    }
}

mod bare_uuid {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    use crate::identifier::Identifier;

    pub(super) fn serialize<S: Serializer>(value: &Identifier, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_uuid().serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Identifier, D::Error> {
        Uuid::deserialize(deserializer).map(Identifier::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Renamed {
        name: String,
    }

    crate::normalizable!(Renamed, "renamed");

    impl EventPayload for Renamed {}

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn now(&self) -> Datetime {
            Datetime::from(Utc.timestamp_opt(1_768_471_200, 123_456_789).unwrap())
        }
    }

    fn renamed(name: &str) -> Event<Renamed> {
        Event::new(
            Renamed {
                name: name.to_owned(),
            },
            &FrozenClock,
        )
    }

    #[test]
    fn test_new_event_is_stamped_by_clock_without_emitter() {
        let event = renamed("ada");

        assert_eq!(event.recorded_at(), FrozenClock.now());
        assert_eq!(event.emitter_id(), None);
        assert_eq!(event.name(), "renamed");
    }

    #[test]
    fn test_assign_emitter_is_write_once() {
        // Arrange
        let mut event = renamed("ada");
        let emitter = Identifier::generate();

        // Act
        event.assign_emitter(emitter, "member").unwrap();
        let same = event.assign_emitter(emitter, "member");
        let other = event.assign_emitter(Identifier::generate(), "member");

        // Assert
        assert!(same.is_ok());
        assert!(matches!(other, Err(DomainError::IdentifierImmutable(id)) if id == emitter));
        assert_eq!(event.emitter_id(), Some(emitter));
        assert_eq!(event.metadata().emitter_type(), "member");
    }

    #[test]
    fn test_record_round_trip() {
        let mut event = renamed("ada");
        event.assign_emitter(Identifier::generate(), "member").unwrap();

        let record = event.to_record().unwrap();
        let rebuilt = Event::<Renamed>::from_record(&record).unwrap();

        assert_eq!(rebuilt, event);
    }

    #[test]
    fn test_record_requires_emitter() {
        assert!(matches!(renamed("ada").to_record(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_record_wire_shape() {
        let mut event = renamed("ada");
        let emitter = Identifier::generate();
        event.assign_emitter(emitter, "member").unwrap();

        let wire = serde_json::to_value(event.to_record().unwrap()).unwrap();

        assert_eq!(wire["record_date"], json!("2026-01-15T10:00:00.123456+00:00"));
        assert_eq!(wire["emitter_id"], json!(emitter.to_string()));
        assert_eq!(wire["emitter_class_name"], json!("member"));
        assert_eq!(wire["payload"], json!({"name": "ada", "type": "renamed"}));
        let back: EventRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(back, event.to_record().unwrap());
    }

    #[test]
    fn test_from_record_surfaces_decode_failure() {
        let mut event = renamed("ada");
        event.assign_emitter(Identifier::generate(), "member").unwrap();
        let mut record = event.to_record().unwrap();
        record.payload.remove("name");

        let result = Event::<Renamed>::from_record(&record);

        assert!(matches!(result, Err(DomainError::PayloadDecode(_))));
    }

    #[test]
    fn test_event_normalize_round_trip() {
        let mut event = renamed("ada");
        event.assign_emitter(Identifier::generate(), "member").unwrap();

        let normalized = event.normalize();

        assert_eq!(normalized.get(TYPE_KEY), Some(&json!("event")));
        assert_eq!(Event::<Renamed>::denormalize(&normalized).unwrap(), event);
    }
}
