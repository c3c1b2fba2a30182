//! Attribute conversion between in-memory values and datastore columns.
//!
//! # Responsibility
//! - Define the converter contract consumed by the store mapping layer.
//! - Own the stable `x:y` storage format for points.
//!
//! # Invariants
//! - Every converter call is counted before any other work happens.
//! - `None` maps to `None` in both directions.
//! - Malformed segment counts decode to `None`; non-integer segments fail.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

pub mod counter;
mod point_converter;

pub use counter::{ConversionCounter, CounterDelta, CounterSnapshot};
pub use point_converter::{
    ConvertiblePointToStringConverter, DeclaredPointConverter, PointToStringConverter,
};

/// Separates `x` and `y` in the encoded point string.
pub const SEPARATOR: char = ':';

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Decode failure that must reach the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// One `x:y` segment is not a 32-bit integer.
    InvalidInteger {
        segment: &'static str,
        value: String,
        source: ParseIntError,
    },
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInteger {
                segment,
                value,
                source,
            } => write!(f, "invalid {segment} segment `{value}` in point: {source}"),
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInteger { source, .. } => Some(source),
        }
    }
}

/// Bidirectional mapping between an attribute type and its datastore form.
pub trait AttributeConverter {
    type Attribute;
    type Datastore;

    /// Converts an attribute value to the value written to the datastore.
    fn to_datastore(&self, attribute: Option<&Self::Attribute>) -> Option<Self::Datastore>;

    /// Converts a datastore value back to the attribute value.
    fn to_attribute(
        &self,
        datastore: Option<&Self::Datastore>,
    ) -> ConvertResult<Option<Self::Attribute>>;
}

/// Encodes `(x, y)` as `x:y`, writing an absent `y` as `0`.
pub(crate) fn encode_coordinates(x: i32, y: Option<i32>) -> String {
    format!("{x}{SEPARATOR}{}", y.unwrap_or(0))
}

/// Decodes `x:y` into coordinates.
///
/// Trailing empty segments are dropped before the segment count is checked,
/// so `"3:"` is malformed while `"1:2:"` decodes as `(1, 2)`.
pub(crate) fn decode_coordinates(value: &str) -> ConvertResult<Option<(i32, i32)>> {
    let mut parts: Vec<&str> = value.split(SEPARATOR).collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    if parts.len() != 2 {
        return Ok(None);
    }

    let x = parse_segment("x", parts[0])?;
    let y = parse_segment("y", parts[1])?;
    Ok(Some((x, y)))
}

fn parse_segment(segment: &'static str, value: &str) -> ConvertResult<i32> {
    value
        .parse::<i32>()
        .map_err(|source| ConvertError::InvalidInteger {
            segment,
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::{decode_coordinates, encode_coordinates, ConvertError};

    #[test]
    fn encode_writes_absent_y_as_zero() {
        assert_eq!(encode_coordinates(1, Some(10)), "1:10");
        assert_eq!(encode_coordinates(-4, None), "-4:0");
    }

    #[test]
    fn decode_drops_trailing_empty_segments() {
        assert_eq!(decode_coordinates("1:2:").expect("decode"), Some((1, 2)));
        assert_eq!(decode_coordinates("3:").expect("decode"), None);
        assert_eq!(decode_coordinates(":").expect("decode"), None);
        assert_eq!(decode_coordinates("").expect("decode"), None);
    }

    #[test]
    fn decode_rejects_too_many_segments_without_error() {
        assert_eq!(decode_coordinates("1:2:3").expect("decode"), None);
    }

    #[test]
    fn decode_fails_on_empty_leading_segment() {
        let err = decode_coordinates(":5").expect_err("empty x must fail");
        assert!(matches!(
            err,
            ConvertError::InvalidInteger { segment: "x", .. }
        ));
    }

    #[test]
    fn decode_accepts_signed_integers() {
        assert_eq!(decode_coordinates("-3:+7").expect("decode"), Some((-3, 7)));
    }

    #[test]
    fn decode_fails_on_overflow() {
        let err = decode_coordinates("1:2147483648").expect_err("overflow must fail");
        assert!(err.to_string().contains("y segment"));
    }
}
