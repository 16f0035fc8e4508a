//! Comparison semantics over normalized values.
//!
//! Every backend evaluates criteria through these functions (directly or via
//! an interpreter of its native filter vocabulary), so a given criteria
//! selects the same elements everywhere.

use std::cmp::Ordering;

use serde_json::Value;

use crate::datetime::Datetime;
use crate::normalize::{Normalizable, type_of};

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn number_cmp(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

/// Total order over normalized values.
///
/// Values of different kinds order by kind
/// (null, number, string, object, array, bool). Tagged datetimes order
/// chronologically; other objects compare entry by entry.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| compare(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        (Value::Object(xs), Value::Object(ys)) => {
            if type_of(a) == Some(Datetime::TYPE_NAME) && type_of(b) == Some(Datetime::TYPE_NAME) {
                let stamp = |m: &serde_json::Map<String, Value>| m.get("iso8601").cloned().unwrap_or(Value::Null);
                return compare(&stamp(xs), &stamp(ys));
            }
            xs.iter()
                .zip(ys)
                .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| compare(vx, vy)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| xs.len().cmp(&ys.len()))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Value equality, numeric-aware (`1 == 1.0`).
#[must_use]
pub fn equals(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b) && compare(a, b).is_eq()
}

/// `eq` semantics: equal, or an array field holding an equal element.
#[must_use]
pub fn matches_eq(field: &Value, operand: &Value) -> bool {
    if equals(field, operand) {
        return true;
    }
    match field {
        Value::Array(items) => items.iter().any(|item| equals(item, operand)),
        _ => false,
    }
}

/// Ordered comparison used by `lt`, `lte`, `gt` and `gte`.
///
/// Returns `None` when the values are of different kinds or either is null,
/// in which case no range operator matches.
#[must_use]
pub fn partial_compare(field: &Value, operand: &Value) -> Option<Ordering> {
    if field.is_null() || operand.is_null() || type_rank(field) != type_rank(operand) {
        return None;
    }
    Some(compare(field, operand))
}

/// `in` semantics: the field matches any operand element under `eq`.
///
/// A non-array operand behaves like a one-element list.
#[must_use]
pub fn matches_in(field: &Value, operand: &Value) -> bool {
    match operand {
        Value::Array(candidates) => candidates.iter().any(|c| matches_eq(field, c)),
        single => matches_eq(field, single),
    }
}

/// `contains` semantics: substring match on strings, or on any string
/// element of an array field.
#[must_use]
pub fn matches_contains(field: &Value, needle: &str) -> bool {
    match field {
        Value::String(haystack) => haystack.contains(needle),
        Value::Array(items) => items.iter().any(|item| matches_contains(item, needle)),
        _ => false,
    }
}

/// Geometry helpers over GeoJSON `Point` and `Polygon` values.
pub mod geo {
    use serde_json::Value;

    /// A planar point.
    pub type Point = (f64, f64);

    /// Parsed GeoJSON geometry.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Geometry {
        /// A single position.
        Point(Point),
        /// A polygon given by its outer ring.
        Polygon(Vec<Point>),
    }

    fn position(value: &Value) -> Option<Point> {
        let coords = value.as_array()?;
        Some((coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
    }

    /// Parses a GeoJSON geometry, accepting the `{"geometry": ...}` wrapper.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Geometry> {
        let value = value.get("geometry").unwrap_or(value);
        let coordinates = value.get("coordinates")?;
        match value.get("type")?.as_str()? {
            "Point" => position(coordinates).map(Geometry::Point),
            "Polygon" => {
                let ring = coordinates.as_array()?.first()?.as_array()?;
                ring.iter()
                    .map(position)
                    .collect::<Option<Vec<_>>>()
                    .map(Geometry::Polygon)
            }
            _ => None,
        }
    }

    /// Ray-casting point-in-polygon test. Points on an edge may land on
    /// either side.
    #[must_use]
    pub fn point_in_polygon(point: Point, ring: &[Point]) -> bool {
        let (x, y) = point;
        let mut inside = false;
        let mut j = ring.len().saturating_sub(1);
        for i in 0..ring.len() {
            let (xi, yi) = ring[i];
            let (xj, yj) = ring[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn vertices(geometry: &Geometry) -> Vec<Point> {
        match geometry {
            Geometry::Point(p) => vec![*p],
            Geometry::Polygon(ring) => ring.clone(),
        }
    }

    fn contains_point(container: &Geometry, point: Point) -> bool {
        match container {
            Geometry::Point(p) => *p == point,
            Geometry::Polygon(ring) => point_in_polygon(point, ring),
        }
    }

    /// `geo_within`: every vertex of `subject` lies inside `container`.
    #[must_use]
    pub fn within(subject: &Geometry, container: &Geometry) -> bool {
        let points = vertices(subject);
        !points.is_empty() && points.into_iter().all(|p| contains_point(container, p))
    }

    /// `geo_intersects`: some vertex of either geometry lies inside the
    /// other.
    #[must_use]
    pub fn intersects(a: &Geometry, b: &Geometry) -> bool {
        vertices(a).into_iter().any(|p| contains_point(b, p))
            || vertices(b).into_iter().any(|p| contains_point(a, p))
    }
}
