//! Criteria expression tree.
//!
//! Leaves are [`Comparison`]s on a dot-path field; internal nodes are
//! [`Logical`] conjunctions or disjunctions. A [`Composite`] holds a node
//! written in a foreign vocabulary and is rewritten into [`Logical`] before
//! any translator sees it.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::DomainError;

/// Comparison operators of the criteria vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Member of the operand list.
    In,
    /// Not a member of the operand list.
    Nin,
    /// Substring match.
    Contains,
    /// Geometry lies within the operand geometry.
    GeoWithin,
    /// Geometry intersects the operand geometry.
    GeoIntersects,
}

impl Operator {
    /// Returns the operator's DSL name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Contains => "contains",
            Self::GeoWithin => "geo_within",
            Self::GeoIntersects => "geo_intersects",
        }
    }
}

impl FromStr for Operator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "in" => Self::In,
            "nin" => Self::Nin,
            "contains" => Self::Contains,
            "geo_within" => Self::GeoWithin,
            "geo_intersects" => Self::GeoIntersects,
            other => return Err(DomainError::UnsupportedOperator(other.to_owned())),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leaf node: `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Dot-path into the element's normalized form.
    pub field: String,
    /// The operator.
    pub operator: Operator,
    /// The operand.
    pub value: Value,
}

/// Logical combinator type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// All sub-expressions hold.
    And,
    /// At least one sub-expression holds.
    Or,
}

impl LogicalType {
    /// Returns the combinator's DSL name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl FromStr for LogicalType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(DomainError::UnsupportedComposite(other.to_owned())),
        }
    }
}

/// Internal node combining sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Logical {
    /// The combinator.
    pub kind: LogicalType,
    /// The combined sub-expressions.
    pub expressions: Vec<Expression>,
}

/// Internal node in a foreign vocabulary (`AND`, `OR`, `&&`, `||`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    /// The foreign combinator name.
    pub kind: String,
    /// The combined sub-expressions.
    pub expressions: Vec<Expression>,
}

/// A predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A comparison leaf.
    Comparison(Comparison),
    /// A canonical logical node.
    Logical(Logical),
    /// A foreign composite node, canonicalized before translation.
    Composite(Composite),
}

impl Expression {
    /// Builds a comparison leaf.
    pub fn comparison(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Comparison(Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    /// Builds a conjunction.
    #[must_use]
    pub fn and(expressions: Vec<Expression>) -> Self {
        Self::Logical(Logical {
            kind: LogicalType::And,
            expressions,
        })
    }

    /// Builds a disjunction.
    #[must_use]
    pub fn or(expressions: Vec<Expression>) -> Self {
        Self::Logical(Logical {
            kind: LogicalType::Or,
            expressions,
        })
    }

    /// Builds a composite node in a foreign vocabulary.
    pub fn composite(kind: impl Into<String>, expressions: Vec<Expression>) -> Self {
        Self::Composite(Composite {
            kind: kind.into(),
            expressions,
        })
    }

    /// Rewrites every composite node into the [`Logical`] vocabulary.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedComposite` for a composite kind with
    /// no logical counterpart.
    pub fn canonicalize(&self) -> Result<Expression, DomainError> {
        match self {
            Self::Comparison(_) => Ok(self.clone()),
            Self::Logical(logical) => Ok(Self::Logical(Logical {
                kind: logical.kind,
                expressions: canonicalize_all(&logical.expressions)?,
            })),
            Self::Composite(composite) => {
                let kind = match composite.kind.to_ascii_lowercase().as_str() {
                    "and" | "&&" => LogicalType::And,
                    "or" | "||" => LogicalType::Or,
                    _ => return Err(DomainError::UnsupportedComposite(composite.kind.clone())),
                };
                Ok(Self::Logical(Logical {
                    kind,
                    expressions: canonicalize_all(&composite.expressions)?,
                }))
            }
        }
    }
}

fn canonicalize_all(expressions: &[Expression]) -> Result<Vec<Expression>, DomainError> {
    expressions.iter().map(Expression::canonicalize).collect()
}

macro_rules! comparison_helpers {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[doc = concat!("Builds a `", stringify!($name), "` comparison.")]
            pub fn $name(field: impl Into<String>, value: impl Into<Value>) -> Expression {
                Expression::comparison(field, Operator::$op, value)
            }
        )*
    };
}

comparison_helpers! {
    eq => Eq,
    neq => Neq,
    lt => Lt,
    lte => Lte,
    gt => Gt,
    gte => Gte,
    is_in => In,
    nin => Nin,
    contains => Contains,
    geo_within => GeoWithin,
    geo_intersects => GeoIntersects,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_operator_parse_rejects_unknown() {
        assert_eq!("gte".parse::<Operator>().unwrap(), Operator::Gte);
        match "like".parse::<Operator>() {
            Err(DomainError::UnsupportedOperator(op)) => assert_eq!(op, "like"),
            other => panic!("expected UnsupportedOperator, got {other:?}"),
        }
    }

    #[test]
    fn test_canonicalize_rewrites_foreign_composites_recursively() {
        let expr = Expression::composite(
            "AND",
            vec![
                eq("status", "active"),
                Expression::composite("||", vec![gt("score", 1), lt("score", -1)]),
            ],
        );

        let canonical = expr.canonicalize().unwrap();

        assert_eq!(
            canonical,
            Expression::and(vec![
                eq("status", "active"),
                Expression::or(vec![gt("score", 1), lt("score", -1)]),
            ])
        );
    }

    #[test]
    fn test_canonicalize_rejects_unknown_composite() {
        let expr = Expression::or(vec![Expression::composite("XOR", vec![eq("a", json!(1))])]);

        match expr.canonicalize() {
            Err(DomainError::UnsupportedComposite(kind)) => assert_eq!(kind, "XOR"),
            other => panic!("expected UnsupportedComposite, got {other:?}"),
        }
    }
}
