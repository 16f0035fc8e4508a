//! Document store contract and an in-process implementation interpreting
//! filter documents.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::RwLock;

use chronicle_core::error::DomainError;
use chronicle_core::expression::Operator;
use chronicle_core::normalize::project;
use chronicle_core::value::{self, geo};

use super::translator::{Document, FindOptions};

/// A store of schemaless documents grouped in named collections.
///
/// Filters use the operator vocabulary produced by
/// [`DocumentTranslator`](super::DocumentTranslator).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replaces the first document matching `filter` with `document`,
    /// inserting it when nothing matches and `upsert` is set.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        document: Document,
        upsert: bool,
    ) -> Result<(), DomainError>;

    /// Returns the documents matching `filter`, sorted then sliced.
    async fn find(&self, collection: &str, filter: &Document, options: &FindOptions)
    -> Result<Vec<Document>, DomainError>;

    /// Deletes every document matching `filter`. Returns the number deleted.
    async fn delete_many(&self, collection: &str, filter: &Document) -> Result<u64, DomainError>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, DomainError>;
}

#[derive(Debug)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Range(Operator, Value),
    In(Value),
    Nin(Value),
    Regex(Regex),
    GeoWithin(geo::Geometry),
    GeoIntersects(geo::Geometry),
}

/// A filter document compiled once, then evaluated against each document.
#[derive(Debug)]
enum Matcher {
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
    Field(String, Vec<Condition>),
}

fn unsupported(operator: &str) -> DomainError {
    DomainError::UnsupportedOperator(operator.to_owned())
}

fn sub_filters(operator: &str, value: &Value) -> Result<Vec<Matcher>, DomainError> {
    value
        .as_array()
        .ok_or_else(|| DomainError::Validation(format!("{operator} expects an array of filters")))?
        .iter()
        .map(|filter| match filter {
            Value::Object(document) => compile(document),
            _ => Err(DomainError::Validation(format!("{operator} expects an array of filters"))),
        })
        .collect()
}

fn geometry_of(operator: &str, value: &Value) -> Result<geo::Geometry, DomainError> {
    value
        .get("$geometry")
        .and_then(geo::parse)
        .ok_or_else(|| DomainError::Validation(format!("{operator} expects a $geometry")))
}

fn condition(operator: &str, operand: &Value) -> Result<Condition, DomainError> {
    Ok(match operator {
        "$eq" => Condition::Eq(operand.clone()),
        "$ne" => Condition::Ne(operand.clone()),
        "$lt" => Condition::Range(Operator::Lt, operand.clone()),
        "$lte" => Condition::Range(Operator::Lte, operand.clone()),
        "$gt" => Condition::Range(Operator::Gt, operand.clone()),
        "$gte" => Condition::Range(Operator::Gte, operand.clone()),
        "$in" => Condition::In(operand.clone()),
        "$nin" => Condition::Nin(operand.clone()),
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| DomainError::Validation("$regex expects a string pattern".to_owned()))?;
            let regex = Regex::new(pattern)
                .map_err(|e| DomainError::Validation(format!("invalid $regex {pattern:?}: {e}")))?;
            Condition::Regex(regex)
        }
        "$geoWithin" => Condition::GeoWithin(geometry_of(operator, operand)?),
        "$geoIntersects" => Condition::GeoIntersects(geometry_of(operator, operand)?),
        other => return Err(unsupported(other)),
    })
}

fn field_conditions(value: &Value) -> Result<Vec<Condition>, DomainError> {
    match value {
        Value::Object(operators) if !operators.is_empty() && operators.keys().all(|k| k.starts_with('$')) => {
            operators
                .iter()
                .map(|(operator, operand)| condition(operator, operand))
                .collect()
        }
        exact => Ok(vec![Condition::Eq(exact.clone())]),
    }
}

fn compile(filter: &Document) -> Result<Matcher, DomainError> {
    let mut clauses = Vec::with_capacity(filter.len());
    for (key, value) in filter {
        clauses.push(match key.as_str() {
            "$and" => Matcher::All(sub_filters(key, value)?),
            "$or" => Matcher::Any(sub_filters(key, value)?),
            operator if operator.starts_with('$') => return Err(unsupported(operator)),
            field => Matcher::Field(field.to_owned(), field_conditions(value)?),
        });
    }
    Ok(Matcher::All(clauses))
}

fn regex_matches(field: &Value, regex: &Regex) -> bool {
    match field {
        Value::String(text) => regex.is_match(text),
        Value::Array(items) => items.iter().any(|item| regex_matches(item, regex)),
        _ => false,
    }
}

impl Condition {
    fn holds(&self, field: &Value) -> bool {
        match self {
            Self::Eq(operand) => value::matches_eq(field, operand),
            Self::Ne(operand) => !value::matches_eq(field, operand),
            Self::Range(operator, operand) => match value::partial_compare(field, operand) {
                Some(ordering) => match operator {
                    Operator::Lt => ordering.is_lt(),
                    Operator::Lte => ordering.is_le(),
                    Operator::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
                None => false,
            },
            Self::In(operand) => value::matches_in(field, operand),
            Self::Nin(operand) => !value::matches_in(field, operand),
            Self::Regex(regex) => regex_matches(field, regex),
            Self::GeoWithin(container) => geo::parse(field).is_some_and(|g| geo::within(&g, container)),
            Self::GeoIntersects(other) => geo::parse(field).is_some_and(|g| geo::intersects(&g, other)),
        }
    }
}

impl Matcher {
    fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All(matchers) => matchers.iter().all(|m| m.matches(document)),
            Self::Any(matchers) => matchers.iter().any(|m| m.matches(document)),
            Self::Field(path, conditions) => {
                let field = project(document, path);
                conditions.iter().all(|c| c.holds(&field))
            }
        }
    }
}

fn sort_documents(documents: &mut [Value], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        sort.iter()
            .map(|(field, direction)| {
                let ordering = value::compare(&project(a, field), &project(b, field));
                if *direction < 0 { ordering.reverse() } else { ordering }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn to_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Document store held in memory. Each collection keeps its documents in
/// insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of a collection's documents, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter_map(|document| document.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        document: Document,
        upsert: bool,
    ) -> Result<(), DomainError> {
        let matcher = compile(filter)?;
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_owned()).or_default();
        match documents.iter_mut().find(|existing| matcher.matches(existing)) {
            Some(existing) => *existing = Value::Object(document),
            None if upsert => documents.push(Value::Object(document)),
            None => {}
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, DomainError> {
        let matcher = compile(filter)?;
        let collections = self.collections.read().await;
        let mut found: Vec<Value> = collections
            .get(collection)
            .map(|documents| documents.iter().filter(|d| matcher.matches(d)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        sort_documents(&mut found, &options.sort);
        Ok(found
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .filter_map(|document| match document {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> Result<u64, DomainError> {
        let matcher = compile(filter)?;
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|document| !matcher.matches(document));
        Ok(to_count(before - documents.len()))
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, DomainError> {
        let matcher = compile(filter)?;
        let collections = self.collections.read().await;
        Ok(to_count(
            collections
                .get(collection)
                .map_or(0, |documents| documents.iter().filter(|d| matcher.matches(d)).count()),
        ))
    }
}
