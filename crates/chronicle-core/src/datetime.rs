//! Timestamp value object.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::DomainError;
use crate::normalize::{Normalizable, TYPE_KEY, TaggedMap, expect_type};

/// ISO-8601 layout with microseconds and a numeric offset.
pub const ISO8601_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// UTC timestamp with microsecond precision.
///
/// Sub-microsecond precision is dropped on construction so that values
/// survive a round trip through storage unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Datetime(DateTime<Utc>);

impl Datetime {
    /// Returns the wrapped `chrono` timestamp.
    #[must_use]
    pub fn as_chrono(&self) -> DateTime<Utc> {
        self.0
    }

    /// Formats the timestamp as ISO-8601 with microseconds.
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        self.0.format(ISO8601_MICROS).to_string()
    }

    /// Parses an RFC 3339 / ISO-8601 timestamp.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if `raw` is not a valid timestamp.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| Self::from(dt.with_timezone(&Utc)))
            .map_err(|e| DomainError::PayloadDecode(format!("invalid timestamp {raw:?}: {e}")))
    }
}

impl From<DateTime<Utc>> for Datetime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(6))
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Normalizable for Datetime {
    const TYPE_NAME: &'static str = "datetime";

    fn normalize(&self) -> TaggedMap {
        let mut map = TaggedMap::new();
        map.insert("iso8601".to_owned(), Value::String(self.to_iso8601()));
        map.insert(TYPE_KEY.to_owned(), Value::String(Self::TYPE_NAME.to_owned()));
        map
    }

    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
        expect_type(data, Self::TYPE_NAME)?;
        let raw = data
            .get("iso8601")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::PayloadDecode("datetime without iso8601".to_owned()))?;
        Self::parse(raw)
    }
}

impl Serialize for Datetime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.normalize().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datetime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = TaggedMap::deserialize(deserializer)?;
        Self::denormalize(&data).map_err(D::Error::custom)
    }
}
