//! Normalization protocol.
//!
//! Every persistable value converts to and from a *tagged map*: a JSON object
//! holding the value's fields plus a reserved [`TYPE_KEY`] discriminator that
//! names the originating type. Nested normalizable values carry their own
//! discriminator, so any map holding one can be handed to the matching
//! reconstruction function.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DomainError;

/// Reserved key holding the type discriminator of a tagged map.
///
/// GeoJSON geometries use the same key for their geometry kind. They are
/// opaque values: a nested map is only decoded through the type of the field
/// holding it, never by looking its discriminator up in a [`Registry`].
pub const TYPE_KEY: &str = "type";

/// Plain-data representation of a normalizable value.
pub type TaggedMap = Map<String, Value>;

/// Bidirectional conversion between a typed value and its tagged map.
pub trait Normalizable: Sized {
    /// Discriminator written under [`TYPE_KEY`].
    const TYPE_NAME: &'static str;

    /// Converts the value into its tagged map.
    fn normalize(&self) -> TaggedMap;

    /// Rebuilds the value from its tagged map.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if the map does not describe a
    /// value of this type.
    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError>;

    /// Projects a dot-path into the normalized form. Always returns a
    /// sequence, even for singular results.
    fn query(&self, path: &str) -> Vec<Value> {
        query_value(&Value::Object(self.normalize()), path)
    }

    /// Returns `true` if `value` is a map tagged with this type.
    fn is_denormalizable(value: &Value) -> bool {
        type_of(value) == Some(Self::TYPE_NAME)
    }
}

/// Implements [`Normalizable`] for a serde-derived type.
///
/// Nested identifiers, datetimes and other normalizable fields keep their own
/// tags because their serde representation is their tagged map.
#[macro_export]
macro_rules! normalizable {
    ($ty:ty, $name:expr) => {
        impl $crate::normalize::Normalizable for $ty {
            const TYPE_NAME: &'static str = $name;

            fn normalize(&self) -> $crate::normalize::TaggedMap {
                $crate::normalize::to_tagged(self, $name)
            }

            fn denormalize(
                data: &$crate::normalize::TaggedMap,
            ) -> ::std::result::Result<Self, $crate::error::DomainError> {
                $crate::normalize::from_tagged(data, $name)
            }
        }
    };
}

/// Returns the discriminator of a tagged map, if `value` is one.
#[must_use]
pub fn type_of(value: &Value) -> Option<&str> {
    value.as_object()?.get(TYPE_KEY)?.as_str()
}

/// Serializes `value` and tags it with `type_name`.
///
/// A value that does not serialize to a JSON object is stored under a
/// `value` key.
///
/// # Panics
///
/// Panics if the `Serialize` implementation of `value` fails, for example on
/// a map with non-string keys. Types passed to [`normalizable!`] must have
/// string-keyed fields only.
pub fn to_tagged<T: Serialize>(value: &T, type_name: &str) -> TaggedMap {
    let serialized = serde_json::to_value(value).expect("normalizable types serialize to JSON");
    let mut map = match serialized {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other);
            map
        }
    };
    map.insert(TYPE_KEY.to_owned(), Value::String(type_name.to_owned()));
    map
}

/// Deserializes a tagged map after checking its discriminator.
///
/// # Errors
///
/// Returns `DomainError::PayloadDecode` on a discriminator mismatch or when
/// the fields do not match the target type.
pub fn from_tagged<T: DeserializeOwned>(data: &TaggedMap, type_name: &str) -> Result<T, DomainError> {
    expect_type(data, type_name)?;
    let mut fields = data.clone();
    fields.remove(TYPE_KEY);
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Checks that `data` is tagged with `type_name`.
///
/// # Errors
///
/// Returns `DomainError::PayloadDecode` if the discriminator is missing or
/// names another type.
pub fn expect_type(data: &TaggedMap, type_name: &str) -> Result<(), DomainError> {
    match data.get(TYPE_KEY).and_then(Value::as_str) {
        Some(found) if found == type_name => Ok(()),
        Some(found) => Err(DomainError::PayloadDecode(format!(
            "expected type {type_name}, found {found}"
        ))),
        None => Err(DomainError::PayloadDecode(format!(
            "missing `{TYPE_KEY}` discriminator, expected {type_name}"
        ))),
    }
}

/// Projects a dot-path into a normalized value.
///
/// Each segment descends into the current map. When the segment is absent
/// from a map but present one level down, the projection maps over that
/// level (the `elements` of a normalized collection, or the map's values).
/// Arrays are projected element-wise. Missing fields yield `null`.
#[must_use]
pub fn project(value: &Value, path: &str) -> Value {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .fold(value.clone(), |current, segment| step(&current, segment))
}

fn step(current: &Value, segment: &str) -> Value {
    match current {
        Value::Object(map) => {
            if let Some(found) = map.get(segment) {
                return found.clone();
            }
            let children: Vec<&Value> = match map.get("elements") {
                Some(Value::Array(elements)) if map.contains_key(TYPE_KEY) => {
                    elements.iter().collect()
                }
                _ => map.values().filter(|v| v.is_object()).collect(),
            };
            if children.iter().any(|child| child.get(segment).is_some()) {
                Value::Array(
                    children
                        .into_iter()
                        .map(|child| child.get(segment).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            } else {
                Value::Null
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| step(item, segment)).collect()),
        _ => Value::Null,
    }
}

/// Projects a dot-path and returns the result as a sequence.
///
/// An array result is returned element by element; any other result is
/// wrapped in a single-element sequence. An empty subject yields an empty
/// sequence.
#[must_use]
pub fn query_value(value: &Value, path: &str) -> Vec<Value> {
    let empty = match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Vec::new();
    }
    match project(value, path) {
        Value::Array(items) => items,
        other => vec![other],
    }
}

type Factory<T> = Box<dyn Fn(&TaggedMap) -> Result<T, DomainError> + Send + Sync>;

/// Maps type discriminators to reconstruction functions for a closed family
/// of normalizable types (typically the variants of an event enum).
///
/// Built once, at startup, and consulted instead of resolving types by name.
pub struct Registry<T> {
    factories: HashMap<&'static str, Factory<T>>,
}

impl<T: 'static> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `N` under its discriminator, wrapping decoded values with
    /// `wrap`.
    #[must_use]
    pub fn register<N: Normalizable + 'static>(mut self, wrap: fn(N) -> T) -> Self {
        self.factories.insert(
            N::TYPE_NAME,
            Box::new(move |data| N::denormalize(data).map(wrap)),
        );
        self
    }

    /// Returns `true` if `value` is a map tagged with a registered type.
    #[must_use]
    pub fn is_denormalizable(&self, value: &Value) -> bool {
        type_of(value).is_some_and(|name| self.factories.contains_key(name))
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Rebuilds a value by dispatching on the map's discriminator.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if the discriminator is missing
    /// or unregistered, or if the registered factory rejects the map.
    pub fn denormalize(&self, data: &TaggedMap) -> Result<T, DomainError> {
        let name = data
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::PayloadDecode(format!("missing `{TYPE_KEY}` discriminator")))?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DomainError::PayloadDecode(format!("unregistered type: {name}")))?;
        factory(data)
    }
}

impl<T: 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&&str> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("types", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    crate::normalizable!(Address, "address");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        address: Address,
    }

    crate::normalizable!(Contact, "contact");

    #[derive(Debug, PartialEq)]
    enum Shape {
        Address(Address),
        Contact(Contact),
    }

    #[test]
    fn test_normalize_tags_the_map_with_its_type() {
        let address = Address {
            city: "Lyon".to_owned(),
            zip: None,
        };

        let normalized = address.normalize();

        assert_eq!(normalized.get(TYPE_KEY), Some(&json!("address")));
        assert_eq!(normalized.get("city"), Some(&json!("Lyon")));
    }

    #[test]
    fn test_nested_geometry_stays_an_opaque_value() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Site {
            name: String,
            shape: Value,
        }
        crate::normalizable!(Site, "site");
        let site = Site {
            name: "depot".to_owned(),
            shape: json!({"type": "Point", "coordinates": [2.0, 2.0]}),
        };
        let registry: Registry<Site> = Registry::new().register::<Site>(|site| site);

        let normalized = site.normalize();

        assert!(!registry.is_denormalizable(&normalized["shape"]));
        assert_eq!(registry.denormalize(&normalized).unwrap(), site);
    }

    #[test]
    fn test_to_tagged_wraps_non_object_values() {
        let tagged = to_tagged(&vec![1, 2], "levels");

        assert_eq!(Value::Object(tagged), json!({"value": [1, 2], "type": "levels"}));
    }

    #[test]
    fn test_denormalize_rejects_foreign_discriminator() {
        let mut data = Address {
            city: "Lyon".to_owned(),
            zip: None,
        }
        .normalize();
        data.insert(TYPE_KEY.to_owned(), json!("contact"));

        let result = Address::denormalize(&data);

        match result {
            Err(DomainError::PayloadDecode(msg)) => assert!(msg.contains("contact")),
            other => panic!("expected PayloadDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_is_denormalizable_checks_the_discriminator() {
        assert!(Address::is_denormalizable(&json!({"type": "address", "city": "x"})));
        assert!(!Address::is_denormalizable(&json!({"city": "x"})));
        assert!(!Address::is_denormalizable(&json!("address")));
    }

    #[test]
    fn test_query_descends_dot_path() {
        let value = json!({"a": {"b": 5}});

        assert_eq!(query_value(&value, "a.b"), vec![json!(5)]);
    }

    #[test]
    fn test_query_maps_over_array_and_substitutes_null() {
        let value = json!([{"a": {"b": 5}}, {"a": {}}, {"a": {"b": 7}}]);

        assert_eq!(
            query_value(&value, "a.b"),
            vec![json!(5), Value::Null, json!(7)]
        );
    }

    #[test]
    fn test_query_maps_one_level_down_when_segment_absent() {
        let value = json!({
            "first": {"score": 1},
            "second": {"score": 2},
        });

        assert_eq!(query_value(&value, "score"), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_query_on_empty_subject_returns_empty_sequence() {
        assert!(query_value(&json!({}), "a").is_empty());
        assert!(query_value(&Value::Null, "a").is_empty());
    }

    #[test]
    fn test_query_missing_field_returns_null_entry() {
        assert_eq!(query_value(&json!({"a": 1}), "b.c"), vec![Value::Null]);
    }

    #[test]
    fn test_nested_values_keep_their_tags() {
        let contact = Contact {
            name: "Ada".to_owned(),
            address: Address {
                city: "Paris".to_owned(),
                zip: Some("75001".to_owned()),
            },
        };

        assert_eq!(contact.query("address.city"), vec![json!("Paris")]);
        let roundtrip = Contact::denormalize(&contact.normalize()).unwrap();
        assert_eq!(roundtrip, contact);
    }

    #[test]
    fn test_registry_dispatches_on_discriminator() {
        let registry = Registry::new()
            .register(Shape::Address)
            .register(Shape::Contact);
        let address = Address {
            city: "Nantes".to_owned(),
            zip: None,
        };

        let rebuilt = registry.denormalize(&address.normalize()).unwrap();

        assert_eq!(rebuilt, Shape::Address(address));
        assert!(registry.is_denormalizable(&json!({"type": "contact"})));
        assert!(!registry.is_denormalizable(&json!({"type": "unknown"})));
    }

    #[test]
    fn test_registry_rejects_unregistered_type() {
        let registry: Registry<Shape> = Registry::new().register(Shape::Address);
        let data = json!({"type": "contact", "name": "x"});

        let result = registry.denormalize(data.as_object().unwrap());

        assert!(matches!(result, Err(DomainError::PayloadDecode(_))));
    }
}
