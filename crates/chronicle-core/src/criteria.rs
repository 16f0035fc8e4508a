//! Backend-agnostic query descriptor: predicate, orderings and slice.

use std::str::FromStr;

use serde_json::{Map, Value, json};

use crate::error::DomainError;
use crate::expression::{Comparison, Composite, Expression, Logical, LogicalType, Operator};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Returns the direction's DSL name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DomainError::Validation(format!("unknown sort direction: {other}"))),
        }
    }
}

/// One sort key: a dot-path field and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dot-path into the element's normalized form.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Immutable query descriptor.
///
/// Builder methods consume and return the criteria, so a value never changes
/// once handed to a storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    expression: Option<Expression>,
    orderings: Vec<SortKey>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl Criteria {
    /// Creates a criteria matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate, replacing any previous one.
    #[must_use]
    pub fn filter(mut self, expression: Expression) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Adds a predicate, combined with any previous one by conjunction.
    #[must_use]
    pub fn and_filter(mut self, expression: Expression) -> Self {
        self.expression = Some(match self.expression.take() {
            Some(existing) => Expression::and(vec![existing, expression]),
            None => expression,
        });
        self
    }

    /// Adds a predicate, combined with any previous one by disjunction.
    #[must_use]
    pub fn or_filter(mut self, expression: Expression) -> Self {
        self.expression = Some(match self.expression.take() {
            Some(existing) => Expression::or(vec![existing, expression]),
            None => expression,
        });
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.orderings.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Keeps at most `limit` results.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets both offset and limit.
    #[must_use]
    pub fn slice(self, offset: usize, limit: usize) -> Self {
        self.with_offset(offset).with_limit(limit)
    }

    /// Returns the same criteria with no offset or limit.
    #[must_use]
    pub fn without_slice(mut self) -> Self {
        self.offset = None;
        self.limit = None;
        self
    }

    /// Returns the predicate, if any.
    #[must_use]
    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    /// Returns the sort keys in precedence order.
    #[must_use]
    pub fn orderings(&self) -> &[SortKey] {
        &self.orderings
    }

    /// Returns the offset, if set.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Returns the limit, if set.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns `true` if an offset or a limit is set.
    #[must_use]
    pub fn is_sliced(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    /// Parses the JSON criteria DSL.
    ///
    /// ```json
    /// {
    ///   "where": {"type": "and", "expressions": [
    ///       {"field": "status", "operator": "eq", "value": "active"},
    ///       {"field": "score", "operator": "gte", "value": 10}
    ///   ]},
    ///   "order_by": [{"field": "score", "direction": "desc"}],
    ///   "offset": 0,
    ///   "limit": 20
    /// }
    /// ```
    ///
    /// Composite nodes whose `type` is not a canonical `and`/`or` are kept as
    /// [`Composite`] and canonicalized at translation time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedOperator` for an unknown operator and
    /// `DomainError::Validation` for a malformed document.
    pub fn from_json(value: &Value) -> Result<Self, DomainError> {
        let doc = value
            .as_object()
            .ok_or_else(|| DomainError::Validation("criteria must be an object".to_owned()))?;
        let mut criteria = Self::new();
        if let Some(expr) = doc.get("where").filter(|v| !v.is_null()) {
            criteria.expression = Some(parse_expression(expr)?);
        }
        if let Some(orderings) = doc.get("order_by") {
            let keys = orderings
                .as_array()
                .ok_or_else(|| DomainError::Validation("order_by must be an array".to_owned()))?;
            for key in keys {
                let field = key
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DomainError::Validation("order_by entry without field".to_owned()))?;
                let direction = match key.get("direction").and_then(Value::as_str) {
                    Some(raw) => raw.parse()?,
                    None => Direction::Asc,
                };
                criteria = criteria.order_by(field, direction);
            }
        }
        criteria.offset = parse_count(doc, "offset")?;
        criteria.limit = parse_count(doc, "limit")?;
        Ok(criteria)
    }

    /// Renders the criteria in the JSON DSL accepted by [`Criteria::from_json`].
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        if let Some(expr) = &self.expression {
            doc.insert("where".to_owned(), render_expression(expr));
        }
        if !self.orderings.is_empty() {
            let keys = self
                .orderings
                .iter()
                .map(|k| json!({"field": k.field, "direction": k.direction.as_str()}))
                .collect();
            doc.insert("order_by".to_owned(), Value::Array(keys));
        }
        if let Some(offset) = self.offset {
            doc.insert("offset".to_owned(), json!(offset));
        }
        if let Some(limit) = self.limit {
            doc.insert("limit".to_owned(), json!(limit));
        }
        Value::Object(doc)
    }
}

fn parse_count(doc: &Map<String, Value>, key: &str) -> Result<Option<usize>, DomainError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| DomainError::Validation(format!("{key} must be a non-negative integer"))),
    }
}

fn parse_expression(value: &Value) -> Result<Expression, DomainError> {
    let node = value
        .as_object()
        .ok_or_else(|| DomainError::Validation("expression must be an object".to_owned()))?;
    if let Some(field) = node.get("field") {
        let field = field
            .as_str()
            .ok_or_else(|| DomainError::Validation("comparison field must be a string".to_owned()))?;
        let operator: Operator = node
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::Validation("comparison without operator".to_owned()))?
            .parse()?;
        let operand = node.get("value").cloned().unwrap_or(Value::Null);
        return Ok(Expression::comparison(field, operator, operand));
    }
    let expressions = node
        .get("expressions")
        .and_then(Value::as_array)
        .ok_or_else(|| DomainError::Validation("expression is neither comparison nor composite".to_owned()))?
        .iter()
        .map(parse_expression)
        .collect::<Result<Vec<_>, _>>()?;
    let kind = node
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Validation("composite without type".to_owned()))?;
    Ok(match kind.parse::<LogicalType>() {
        Ok(kind) => Expression::Logical(Logical { kind, expressions }),
        Err(_) => Expression::Composite(Composite {
            kind: kind.to_owned(),
            expressions,
        }),
    })
}

fn render_expression(expr: &Expression) -> Value {
    match expr {
        Expression::Comparison(Comparison {
            field,
            operator,
            value,
        }) => json!({"field": field, "operator": operator.as_str(), "value": value}),
        Expression::Logical(Logical { kind, expressions }) => json!({
            "type": kind.as_str(),
            "expressions": expressions.iter().map(render_expression).collect::<Vec<_>>(),
        }),
        Expression::Composite(Composite { kind, expressions }) => json!({
            "type": kind,
            "expressions": expressions.iter().map(render_expression).collect::<Vec<_>>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{eq, gte};

    #[test]
    fn test_and_filter_conjoins_with_existing_predicate() {
        let criteria = Criteria::new()
            .filter(eq("status", "active"))
            .and_filter(gte("score", 10));

        assert_eq!(
            criteria.expression(),
            Some(&Expression::and(vec![eq("status", "active"), gte("score", 10)]))
        );
    }

    #[test]
    fn test_slice_and_without_slice() {
        let criteria = Criteria::new().slice(2, 3);
        assert_eq!((criteria.offset(), criteria.limit()), (Some(2), Some(3)));
        assert!(criteria.is_sliced());

        let unsliced = criteria.without_slice();
        assert!(!unsliced.is_sliced());
    }

    #[test]
    fn test_from_json_parses_full_document() {
        let doc = json!({
            "where": {"type": "and", "expressions": [
                {"field": "status", "operator": "eq", "value": "active"},
                {"field": "score", "operator": "gte", "value": 10}
            ]},
            "order_by": [{"field": "score", "direction": "DESC"}, {"field": "name"}],
            "offset": 2,
            "limit": 3
        });

        let criteria = Criteria::from_json(&doc).unwrap();

        let expected = Criteria::new()
            .filter(Expression::and(vec![eq("status", "active"), gte("score", 10)]))
            .order_by("score", Direction::Desc)
            .order_by("name", Direction::Asc)
            .slice(2, 3);
        assert_eq!(criteria, expected);
        assert_eq!(Criteria::from_json(&criteria.to_json()).unwrap(), expected);
    }

    #[test]
    fn test_from_json_keeps_foreign_composite_for_later_canonicalization() {
        let doc = json!({"where": {"type": "OR", "expressions": [
            {"field": "a", "operator": "eq", "value": 1}
        ]}});

        let criteria = Criteria::from_json(&doc).unwrap();

        assert!(matches!(criteria.expression(), Some(Expression::Composite(_))));
    }

    #[test]
    fn test_from_json_rejects_unknown_operator() {
        let doc = json!({"where": {"field": "a", "operator": "like", "value": "x"}});

        assert!(matches!(
            Criteria::from_json(&doc),
            Err(DomainError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_negative_limit() {
        assert!(matches!(
            Criteria::from_json(&json!({"limit": -1})),
            Err(DomainError::Validation(_))
        ));
    }
}
