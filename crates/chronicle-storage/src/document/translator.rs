//! Translator producing document-store filter documents.

use serde_json::{Map, Value, json};

use chronicle_core::criteria::{Criteria, Direction, SortKey};
use chronicle_core::error::DomainError;
use chronicle_core::expression::{Comparison, Logical, LogicalType, Operator};
use chronicle_core::translator::Translator;

/// A filter document, e.g. `{"score": {"$gte": 10}}`.
pub type Document = Map<String, Value>;

/// Skip/limit pair of a find request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slicing {
    /// Documents to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

/// Options of a find request: sort keys (`1` ascending, `-1` descending),
/// then skip and limit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, i32)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Builds the options carried by a criteria's orderings and slice.
    #[must_use]
    pub fn from_criteria(criteria: &Criteria) -> Self {
        let Slicing { skip, limit } = DocumentTranslator::translate_slicing(criteria.offset(), criteria.limit());
        Self {
            sort: DocumentTranslator::translate_orderings(criteria.orderings()),
            skip,
            limit,
        }
    }
}

/// Compiles criteria into the operator vocabulary of a document store.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTranslator;

impl DocumentTranslator {
    /// Returns the filter document of a criteria; an empty document matches
    /// everything.
    ///
    /// # Errors
    ///
    /// See [`Translator::translate_expression`].
    pub fn filter(&self, criteria: &Criteria) -> Result<Document, DomainError> {
        match criteria.expression() {
            Some(expression) => self.translate_expression(expression),
            None => Ok(Document::new()),
        }
    }
}

fn single(field: &str, condition: Value) -> Document {
    let mut document = Document::new();
    document.insert(field.to_owned(), condition);
    document
}

fn geometry(operator: Operator, operand: &Value) -> Result<Value, DomainError> {
    let geometry = operand.get("geometry").unwrap_or(operand);
    match (geometry.get("type"), geometry.get("coordinates")) {
        (Some(kind), Some(coordinates)) => Ok(json!({"type": kind, "coordinates": coordinates})),
        _ => Err(DomainError::Validation(format!(
            "{operator} expects a GeoJSON geometry operand"
        ))),
    }
}

impl Translator for DocumentTranslator {
    type Filter = Document;
    type Orderings = Vec<(String, i32)>;
    type Slicing = Slicing;

    fn translate_comparison(&self, comparison: &Comparison) -> Result<Document, DomainError> {
        let field = comparison.field.as_str();
        let value = comparison.value.clone();

        let condition = match comparison.operator {
            Operator::Eq if value.is_object() => json!({"$eq": value}),
            Operator::Eq => return Ok(single(field, value)),
            Operator::Neq => json!({"$ne": value}),
            Operator::Lt => json!({"$lt": value}),
            Operator::Lte => json!({"$lte": value}),
            Operator::Gt => json!({"$gt": value}),
            Operator::Gte => json!({"$gte": value}),
            Operator::In => json!({"$in": value}),
            Operator::Nin => json!({"$nin": value}),
            Operator::Contains => {
                let needle = value
                    .as_str()
                    .ok_or_else(|| DomainError::Validation("contains expects a string operand".to_owned()))?;
                json!({"$regex": format!(".*{}.*", regex::escape(needle))})
            }
            Operator::GeoWithin => json!({"$geoWithin": {"$geometry": geometry(Operator::GeoWithin, &value)?}}),
            Operator::GeoIntersects => {
                json!({"$geoIntersects": {"$geometry": geometry(Operator::GeoIntersects, &value)?}})
            }
        };
        Ok(single(field, condition))
    }

    fn translate_logical(&self, logical: &Logical) -> Result<Document, DomainError> {
        let expressions = logical
            .expressions
            .iter()
            .map(|expression| self.dispatch(expression).map(Value::Object))
            .collect::<Result<Vec<_>, _>>()?;
        let key = match logical.kind {
            LogicalType::And => "$and",
            LogicalType::Or => "$or",
        };
        Ok(single(key, Value::Array(expressions)))
    }

    fn translate_orderings(orderings: &[SortKey]) -> Vec<(String, i32)> {
        orderings
            .iter()
            .map(|key| {
                let direction = match key.direction {
                    Direction::Asc => 1,
                    Direction::Desc => -1,
                };
                (key.field.clone(), direction)
            })
            .collect()
    }

    fn translate_slicing(offset: Option<usize>, limit: Option<usize>) -> Slicing {
        Slicing {
            skip: offset.unwrap_or(0),
            limit,
        }
    }
}
