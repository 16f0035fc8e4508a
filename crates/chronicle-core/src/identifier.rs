//! Identifier value object and the write-once identity cell.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;
use crate::normalize::{Normalizable, TYPE_KEY, TaggedMap, expect_type};

/// Opaque, globally unique, immutable identifier. Equality is by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Uuid);

impl Identifier {
    /// Generates a new random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| DomainError::PayloadDecode(format!("invalid identifier {raw:?}: {e}")))
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Reads an identifier from either its tagged map or a bare UUID string.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Self::parse(raw).ok(),
            Value::Object(map) => map.get("uuid")?.as_str().and_then(|raw| Self::parse(raw).ok()),
            _ => None,
        }
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Normalizable for Identifier {
    const TYPE_NAME: &'static str = "identifier";

    fn normalize(&self) -> TaggedMap {
        let mut map = TaggedMap::new();
        map.insert("uuid".to_owned(), Value::String(self.0.to_string()));
        map.insert(TYPE_KEY.to_owned(), Value::String(Self::TYPE_NAME.to_owned()));
        map
    }

    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
        expect_type(data, Self::TYPE_NAME)?;
        let raw = data
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::PayloadDecode("identifier without uuid".to_owned()))?;
        Self::parse(raw)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.normalize().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = TaggedMap::deserialize(deserializer)?;
        Self::denormalize(&data).map_err(D::Error::custom)
    }
}

/// Write-once identity of an entity.
///
/// The identifier is generated lazily on first access when none was
/// assigned; once present it never changes.
#[derive(Default)]
pub struct Identity(OnceLock<Identifier>);

impl Identity {
    /// Creates an identity with no identifier yet.
    #[must_use]
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Creates an identity already holding `id`.
    #[must_use]
    pub fn with(id: Identifier) -> Self {
        Self(OnceLock::from(id))
    }

    /// Returns the identifier, generating one on first access if absent.
    pub fn get(&self) -> Identifier {
        *self.0.get_or_init(Identifier::generate)
    }

    /// Returns the identifier without generating one.
    #[must_use]
    pub fn peek(&self) -> Option<Identifier> {
        self.0.get().copied()
    }

    /// Assigns the identifier.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::IdentifierImmutable` if an identifier is already
    /// present, even if it equals `id`.
    pub fn assign(&self, id: Identifier) -> Result<(), DomainError> {
        self.0
            .set(id)
            .map_err(|_| DomainError::IdentifierImmutable(self.get()))
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        match self.peek() {
            Some(id) => Self::with(id),
            None => Self::new(),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.peek() == other.peek()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(id) => write!(f, "Identity({id})"),
            None => f.write_str("Identity(<unassigned>)"),
        }
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Identifier::deserialize(deserializer).map(Self::with)
    }
}
