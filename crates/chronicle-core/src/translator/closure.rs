//! In-process translator producing closures over normalized elements.

use std::cmp::Ordering;

use serde_json::Value;

use super::Translator;
use crate::criteria::{Direction, SortKey};
use crate::error::DomainError;
use crate::expression::{Comparison, Logical, LogicalType, Operator};
use crate::normalize::project;
use crate::value::{self, geo};

/// Predicate over an element's normalized form.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Comparator over two elements' normalized forms.
pub type Comparator = Box<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Offset/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    /// Number of leading elements to skip.
    pub offset: usize,
    /// Maximum number of elements to keep.
    pub limit: Option<usize>,
}

impl Slice {
    /// Keeps the window of `items` selected by this slice.
    #[must_use]
    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Translator whose artifacts evaluate in process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosureTranslator;

fn range(operator: Operator, ordering: Option<Ordering>) -> bool {
    match (operator, ordering) {
        (Operator::Lt, Some(o)) => o.is_lt(),
        (Operator::Lte, Some(o)) => o.is_le(),
        (Operator::Gt, Some(o)) => o.is_gt(),
        (Operator::Gte, Some(o)) => o.is_ge(),
        _ => false,
    }
}

fn geometry_operand(operator: Operator, operand: &Value) -> Result<geo::Geometry, DomainError> {
    geo::parse(operand).ok_or_else(|| {
        DomainError::Validation(format!("{operator} expects a GeoJSON geometry operand"))
    })
}

impl Translator for ClosureTranslator {
    type Filter = Predicate;
    type Orderings = Comparator;
    type Slicing = Slice;

    fn translate_comparison(&self, comparison: &Comparison) -> Result<Predicate, DomainError> {
        let field = comparison.field.clone();
        let operand = comparison.value.clone();
        let operator = comparison.operator;

        let predicate: Predicate = match operator {
            Operator::Eq => Box::new(move |element: &Value| value::matches_eq(&project(element, &field), &operand)),
            Operator::Neq => {
                Box::new(move |element: &Value| !value::matches_eq(&project(element, &field), &operand))
            }
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => Box::new(move |element: &Value| {
                range(operator, value::partial_compare(&project(element, &field), &operand))
            }),
            Operator::In => Box::new(move |element: &Value| value::matches_in(&project(element, &field), &operand)),
            Operator::Nin => {
                Box::new(move |element: &Value| !value::matches_in(&project(element, &field), &operand))
            }
            Operator::Contains => {
                let needle = operand
                    .as_str()
                    .ok_or_else(|| DomainError::Validation("contains expects a string operand".to_owned()))?
                    .to_owned();
                Box::new(move |element: &Value| value::matches_contains(&project(element, &field), &needle))
            }
            Operator::GeoWithin => {
                let container = geometry_operand(operator, &operand)?;
                Box::new(move |element: &Value| {
                    geo::parse(&project(element, &field)).is_some_and(|g| geo::within(&g, &container))
                })
            }
            Operator::GeoIntersects => {
                let other = geometry_operand(operator, &operand)?;
                Box::new(move |element: &Value| {
                    geo::parse(&project(element, &field)).is_some_and(|g| geo::intersects(&g, &other))
                })
            }
        };
        Ok(predicate)
    }

    fn translate_logical(&self, logical: &Logical) -> Result<Predicate, DomainError> {
        let predicates = logical
            .expressions
            .iter()
            .map(|expression| self.dispatch(expression))
            .collect::<Result<Vec<_>, _>>()?;

        let combined: Predicate = match logical.kind {
            LogicalType::And => Box::new(move |element: &Value| predicates.iter().all(|p| p(element))),
            LogicalType::Or => Box::new(move |element: &Value| predicates.iter().any(|p| p(element))),
        };
        Ok(combined)
    }

    fn translate_orderings(orderings: &[SortKey]) -> Comparator {
        let keys = orderings.to_vec();
        Box::new(move |a: &Value, b: &Value| {
            keys.iter()
                .map(|key| {
                    let ordering = value::compare(&project(a, &key.field), &project(b, &key.field));
                    match key.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    fn translate_slicing(offset: Option<usize>, limit: Option<usize>) -> Slice {
        Slice {
            offset: offset.unwrap_or(0),
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::expression::{Expression, contains, eq, geo_within, gte, is_in, lt, neq, nin};

    fn predicate(expression: &Expression) -> Predicate {
        ClosureTranslator.translate_expression(expression).unwrap()
    }

    #[test]
    fn test_comparisons_project_dot_paths() {
        let element = json!({"profile": {"city": "Lyon", "age": 30}, "tags": ["a", "b"]});

        assert!(predicate(&eq("profile.city", "Lyon"))(&element));
        assert!(predicate(&neq("profile.city", "Paris"))(&element));
        assert!(predicate(&gte("profile.age", 30))(&element));
        assert!(!predicate(&lt("profile.age", 30))(&element));
        assert!(predicate(&is_in("profile.city", json!(["Lyon", "Nice"])))(&element));
        assert!(predicate(&nin("profile.city", json!(["Nice"])))(&element));
        assert!(predicate(&contains("profile.city", "yo"))(&element));
        assert!(predicate(&eq("tags", "b"))(&element));
    }

    #[test]
    fn test_missing_field_never_satisfies_range() {
        let element = json!({"name": "x"});

        assert!(!predicate(&gte("score", 0))(&element));
        assert!(!predicate(&lt("score", 0))(&element));
        assert!(predicate(&neq("score", 0))(&element));
    }

    #[test]
    fn test_logical_nodes_combine_predicates() {
        let both = Expression::and(vec![eq("status", "active"), gte("score", 10)]);
        let either = Expression::composite("OR", vec![eq("status", "active"), gte("score", 10)]);

        assert!(predicate(&both)(&json!({"status": "active", "score": 12})));
        assert!(!predicate(&both)(&json!({"status": "active", "score": 2})));
        assert!(predicate(&either)(&json!({"status": "idle", "score": 12})));
    }

    #[test]
    fn test_contains_requires_string_operand() {
        let result = ClosureTranslator.translate_expression(&contains("name", 3));

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_geo_within_matches_points_inside_polygon() {
        let zone = json!({"type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]]]});
        let within = predicate(&geo_within("location", zone));

        assert!(within(&json!({"location": {"type": "Point", "coordinates": [1, 1]}})));
        assert!(!within(&json!({"location": {"type": "Point", "coordinates": [9, 1]}})));
        assert!(!within(&json!({"name": "nowhere"})));
    }

    #[test]
    fn test_orderings_break_ties_with_next_key() {
        let comparator = ClosureTranslator::translate_orderings(&[
            SortKey {
                field: "group".to_owned(),
                direction: Direction::Asc,
            },
            SortKey {
                field: "score".to_owned(),
                direction: Direction::Desc,
            },
        ]);
        let a = json!({"group": 1, "score": 5});
        let b = json!({"group": 1, "score": 9});
        let c = json!({"group": 0, "score": 1});

        assert_eq!(comparator(&a, &b), Ordering::Greater);
        assert_eq!(comparator(&c, &a), Ordering::Less);
        assert_eq!(comparator(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_slice_supports_offset_or_limit_alone() {
        let items: Vec<i32> = (0..10).collect();

        assert_eq!(ClosureTranslator::translate_slicing(Some(8), None).apply(items.clone()), vec![8, 9]);
        assert_eq!(ClosureTranslator::translate_slicing(None, Some(2)).apply(items.clone()), vec![0, 1]);
        assert_eq!(ClosureTranslator::translate_slicing(Some(2), Some(3)).apply(items), vec![2, 3, 4]);
    }
}
