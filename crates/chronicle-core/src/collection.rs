//! Ordered collections of normalizable elements with side metadata.

use serde_json::{Map, Value};

use crate::criteria::Criteria;
use crate::error::DomainError;
use crate::normalize::{Normalizable, TYPE_KEY, TaggedMap, expect_type, project};
use crate::translator::{ClosureTranslator, Translator};

/// Side metadata carried by a collection (pagination counters, ...).
pub type Meta = Map<String, Value>;

/// A collection type that can be built from, and broken into, elements and
/// metadata. Conversion between kinds goes through [`Collection::morph`].
pub trait CollectionKind<T>: Sized {
    /// Name of the kind, used in error messages.
    const NAME: &'static str;

    /// Builds the kind from elements and metadata.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCollectionType` if the parts do not
    /// satisfy the kind's contract.
    fn from_parts(elements: Vec<T>, meta: Meta) -> Result<Self, DomainError>;

    /// Breaks the collection into elements and metadata.
    fn into_parts(self) -> (Vec<T>, Meta);
}

/// Ordered sequence of elements plus a metadata map.
///
/// Insertion order is preserved unless a criteria re-orders the elements.
/// Metadata survives filtering, sorting and slicing.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    elements: Vec<T>,
    meta: Meta,
}

impl<T> Collection<T> {
    /// Creates a collection without metadata.
    #[must_use]
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            elements,
            meta: Meta::new(),
        }
    }

    /// Returns the collection with `key` set in its metadata.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Appends an element.
    pub fn push(&mut self, element: T) {
        self.elements.push(element);
    }

    /// Returns the metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Returns the elements in order.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the collection holds no element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the first element.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.elements.first()
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }

    /// Consumes the collection, returning its elements.
    #[must_use]
    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    /// Converts into another collection kind, keeping elements and metadata.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCollectionType` if the target kind
    /// refuses the parts.
    pub fn morph<C: CollectionKind<T>>(self) -> Result<C, DomainError> {
        C::from_parts(self.elements, self.meta)
    }
}

impl<T: Normalizable + Clone> Collection<T> {
    /// Applies a criteria: filter, then stable multi-key sort, then slice.
    ///
    /// The original collection is left untouched; the result carries the same
    /// metadata. An empty collection short-circuits without evaluating the
    /// criteria.
    ///
    /// # Errors
    ///
    /// Returns any error raised while translating the criteria's predicate.
    pub fn matching(&self, criteria: &Criteria) -> Result<Self, DomainError> {
        if self.elements.is_empty() {
            return Ok(Self {
                elements: Vec::new(),
                meta: self.meta.clone(),
            });
        }

        let mut rows: Vec<(Value, &T)> = self
            .elements
            .iter()
            .map(|element| (Value::Object(element.normalize()), element))
            .collect();

        if let Some(expression) = criteria.expression() {
            let predicate = ClosureTranslator.translate_expression(expression)?;
            rows.retain(|(normalized, _)| predicate(normalized));
        }

        if !criteria.orderings().is_empty() {
            let comparator = ClosureTranslator::translate_orderings(criteria.orderings());
            rows.sort_by(|(a, _), (b, _)| comparator(a, b));
        }

        if criteria.is_sliced() {
            rows = ClosureTranslator::translate_slicing(criteria.offset(), criteria.limit()).apply(rows);
        }

        Ok(Self {
            elements: rows.into_iter().map(|(_, element)| element.clone()).collect(),
            meta: self.meta.clone(),
        })
    }
}

impl<T: Normalizable> Collection<T> {
    /// Projects a dot-path into every element. Returns one entry per element,
    /// `null` where the path is missing.
    #[must_use]
    pub fn query(&self, path: &str) -> Vec<Value> {
        self.elements
            .iter()
            .map(|element| project(&Value::Object(element.normalize()), path))
            .collect()
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> CollectionKind<T> for Collection<T> {
    const NAME: &'static str = "collection";

    fn from_parts(elements: Vec<T>, meta: Meta) -> Result<Self, DomainError> {
        Ok(Self { elements, meta })
    }

    fn into_parts(self) -> (Vec<T>, Meta) {
        (self.elements, self.meta)
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: Normalizable> Normalizable for Collection<T> {
    const TYPE_NAME: &'static str = "collection";

    fn normalize(&self) -> TaggedMap {
        let mut map = TaggedMap::new();
        map.insert(
            "elements".to_owned(),
            Value::Array(
                self.elements
                    .iter()
                    .map(|element| Value::Object(element.normalize()))
                    .collect(),
            ),
        );
        map.insert("meta".to_owned(), Value::Object(self.meta.clone()));
        map.insert(TYPE_KEY.to_owned(), Value::String(Self::TYPE_NAME.to_owned()));
        map
    }

    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
        expect_type(data, Self::TYPE_NAME)
            .map_err(|e| DomainError::InvalidCollectionType(e.to_string()))?;
        let elements = data
            .get("elements")
            .and_then(Value::as_array)
            .ok_or_else(|| DomainError::PayloadDecode("collection without elements".to_owned()))?
            .iter()
            .map(|element| match element {
                Value::Object(map) => T::denormalize(map),
                other => Err(DomainError::PayloadDecode(format!(
                    "collection element is not a tagged map: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let meta = match data.get("meta") {
            Some(Value::Object(meta)) => meta.clone(),
            _ => Meta::new(),
        };
        Ok(Self { elements, meta })
    }

    fn query(&self, path: &str) -> Vec<Value> {
        Collection::query(self, path)
    }
}

/// One page of a larger result, with pagination counters.
///
/// Requires a `total` counter in the metadata; `offset` and `limit` are
/// optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    elements: Vec<T>,
    meta: Meta,
    total: usize,
}

impl<T> Page<T> {
    /// Returns the elements of this page.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Returns the number of elements matching across all pages.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the offset of this page, zero when unset.
    #[must_use]
    pub fn offset(&self) -> usize {
        meta_count(&self.meta, "offset").unwrap_or(0)
    }

    /// Returns the page size, if bounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        meta_count(&self.meta, "limit")
    }

    /// Returns `true` if elements remain past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset() + self.elements.len() < self.total
    }

    /// Converts back into a plain collection.
    #[must_use]
    pub fn into_collection(self) -> Collection<T> {
        Collection {
            elements: self.elements,
            meta: self.meta,
        }
    }
}

fn meta_count(meta: &Meta, key: &str) -> Option<usize> {
    meta.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

impl<T> CollectionKind<T> for Page<T> {
    const NAME: &'static str = "page";

    fn from_parts(elements: Vec<T>, meta: Meta) -> Result<Self, DomainError> {
        let total = meta_count(&meta, "total").ok_or_else(|| {
            DomainError::InvalidCollectionType(format!(
                "{} requires a `total` counter in its metadata",
                Self::NAME
            ))
        })?;
        Ok(Self {
            elements,
            meta,
            total,
        })
    }

    fn into_parts(self) -> (Vec<T>, Meta) {
        (self.elements, self.meta)
    }
}
