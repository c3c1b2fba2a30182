//! Point value objects persisted through attribute conversion.
//!
//! # Responsibility
//! - Define the plain `Point` value stored by field-level conversion.
//! - Define `ConvertiblePoint`, the variant whose whole type is declared
//!   convertible.
//!
//! # Invariants
//! - `y == None` means "no y provided" and is distinct from `Some(0)`.
//! - Values are never mutated in place; callers replace them.
//! - Accessors never touch conversion counters.

use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Display text used when a `ConvertiblePoint` cannot render its name.
pub const MISSING_COORDINATE_DISPLAY: &str = "missing coordinate getting ConvertiblePoint's values";

/// 2D point with a mandatory `x` and an optional `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    x: i32,
    y: Option<i32>,
}

impl Point {
    /// Creates a point with an explicit `y`.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y: Some(y) }
    }

    /// Creates a point without `y`.
    ///
    /// Encoding collapses this to the same string as `Point::new(x, 0)`.
    pub fn without_y(x: i32) -> Self {
        Self { x, y: None }
    }

    /// Creates a point from raw parts.
    pub fn from_parts(x: i32, y: Option<i32>) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> Option<i32> {
        self.y
    }

    /// Returns `y`, reading an absent value as `0`.
    pub fn y_or_zero(&self) -> i32 {
        self.y.unwrap_or(0)
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.y {
            Some(y) => write!(f, "Point(x: {}, y: {y})", self.x),
            None => write!(f, "Point(x: {}, y: none)", self.x),
        }
    }
}

/// Point whose conversion is declared on the type rather than on the fields
/// that hold it.
///
/// Shares the `x:y` storage format with [`Point`], so either can be used to
/// bind a query parameter against the same column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvertiblePoint {
    x: i32,
    y: Option<i32>,
}

impl ConvertiblePoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y: Some(y) }
    }

    pub fn from_parts(x: i32, y: Option<i32>) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> i32 {
        trace!("event=point_access module=model field=x type=convertible_point");
        self.x
    }

    pub fn y(&self) -> Option<i32> {
        trace!("event=point_access module=model field=y type=convertible_point");
        self.y
    }

    /// Returns `x: <x>, y: <y>`, or `None` when `y` is missing.
    pub fn name(&self) -> Option<String> {
        let y = self.y()?;
        Some(format!("x: {}, y: {y}", self.x()))
    }
}

impl Display for ConvertiblePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "ConvertiblePoint({name})"),
            None => f.write_str(MISSING_COORDINATE_DISPLAY),
        }
    }
}

impl From<ConvertiblePoint> for Point {
    fn from(value: ConvertiblePoint) -> Self {
        Self::from_parts(value.x, value.y)
    }
}

impl From<Point> for ConvertiblePoint {
    fn from(value: Point) -> Self {
        Self::from_parts(value.x, value.y)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConvertiblePoint, Point, MISSING_COORDINATE_DISPLAY};

    #[test]
    fn absent_y_is_not_zero() {
        assert_ne!(Point::without_y(4), Point::new(4, 0));
        assert_eq!(Point::without_y(4).y(), None);
        assert_eq!(Point::without_y(4).y_or_zero(), 0);
    }

    #[test]
    fn convertible_point_displays_name() {
        let point = ConvertiblePoint::new(2, 11);
        assert_eq!(point.name().as_deref(), Some("x: 2, y: 11"));
        assert_eq!(point.to_string(), "ConvertiblePoint(x: 2, y: 11)");
    }

    #[test]
    fn convertible_point_without_y_falls_back_to_diagnostic() {
        let point = ConvertiblePoint::from_parts(7, None);
        assert!(point.name().is_none());
        assert_eq!(point.to_string(), MISSING_COORDINATE_DISPLAY);
    }

    #[test]
    fn conversions_between_point_types_keep_coordinates() {
        let point: Point = ConvertiblePoint::from_parts(3, None).into();
        assert_eq!(point, Point::without_y(3));

        let convertible: ConvertiblePoint = Point::new(3, 12).into();
        assert_eq!(convertible, ConvertiblePoint::new(3, 12));
    }
}
