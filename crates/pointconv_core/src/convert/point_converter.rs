//! Point converters for field-level and type-level declarations.

use super::counter::ConversionCounter;
use super::{decode_coordinates, encode_coordinates, AttributeConverter, ConvertResult};
use crate::model::point::{ConvertiblePoint, Point};
use crate::model::rect::RectVariant;
use log::trace;
use std::sync::Arc;

/// Converter declared on individual `Point` fields.
#[derive(Debug, Clone)]
pub struct PointToStringConverter {
    counter: Arc<ConversionCounter>,
}

impl PointToStringConverter {
    pub fn new(counter: Arc<ConversionCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &Arc<ConversionCounter> {
        &self.counter
    }
}

impl AttributeConverter for PointToStringConverter {
    type Attribute = Point;
    type Datastore = String;

    fn to_datastore(&self, attribute: Option<&Point>) -> Option<String> {
        self.counter.record_to_datastore();
        let encoded = attribute.map(|point| encode_coordinates(point.x(), point.y()));
        trace!(
            "event=convert_to_datastore module=convert type=point null_input={}",
            attribute.is_none()
        );
        encoded
    }

    fn to_attribute(&self, datastore: Option<&String>) -> ConvertResult<Option<Point>> {
        self.counter.record_to_attribute();
        trace!(
            "event=convert_to_attribute module=convert type=point null_input={}",
            datastore.is_none()
        );
        let Some(value) = datastore else {
            return Ok(None);
        };
        Ok(decode_coordinates(value)?.map(|(x, y)| Point::new(x, y)))
    }
}

/// Converter attached to the `ConvertiblePoint` type itself.
///
/// Writes the same format as [`PointToStringConverter`] and records into the
/// same counter.
#[derive(Debug, Clone)]
pub struct ConvertiblePointToStringConverter {
    counter: Arc<ConversionCounter>,
}

impl ConvertiblePointToStringConverter {
    pub fn new(counter: Arc<ConversionCounter>) -> Self {
        Self { counter }
    }
}

impl AttributeConverter for ConvertiblePointToStringConverter {
    type Attribute = ConvertiblePoint;
    type Datastore = String;

    fn to_datastore(&self, attribute: Option<&ConvertiblePoint>) -> Option<String> {
        self.counter.record_to_datastore();
        trace!(
            "event=convert_to_datastore module=convert type=convertible_point null_input={}",
            attribute.is_none()
        );
        attribute.map(|point| encode_coordinates(point.x(), point.y()))
    }

    fn to_attribute(&self, datastore: Option<&String>) -> ConvertResult<Option<ConvertiblePoint>> {
        self.counter.record_to_attribute();
        trace!(
            "event=convert_to_attribute module=convert type=convertible_point null_input={}",
            datastore.is_none()
        );
        let Some(value) = datastore else {
            return Ok(None);
        };
        Ok(decode_coordinates(value)?.map(|(x, y)| ConvertiblePoint::new(x, y)))
    }
}

/// Converter selected by where a rect class declares its point conversion.
///
/// Field-level declarations convert `Point` directly; type-level declarations
/// go through `ConvertiblePoint`. Both write the same string.
#[derive(Debug, Clone)]
pub enum DeclaredPointConverter {
    Field(PointToStringConverter),
    Type(ConvertiblePointToStringConverter),
}

impl DeclaredPointConverter {
    pub fn for_variant(variant: RectVariant, counter: &Arc<ConversionCounter>) -> Self {
        match variant {
            RectVariant::FieldConverted => {
                Self::Field(PointToStringConverter::new(Arc::clone(counter)))
            }
            RectVariant::TypeConverted => {
                Self::Type(ConvertiblePointToStringConverter::new(Arc::clone(counter)))
            }
        }
    }

    pub fn encode(&self, point: Option<&Point>) -> Option<String> {
        match self {
            Self::Field(converter) => converter.to_datastore(point),
            Self::Type(converter) => {
                let convertible = point.copied().map(ConvertiblePoint::from);
                converter.to_datastore(convertible.as_ref())
            }
        }
    }

    pub fn decode(&self, value: Option<&String>) -> ConvertResult<Option<Point>> {
        match self {
            Self::Field(converter) => converter.to_attribute(value),
            Self::Type(converter) => Ok(converter.to_attribute(value)?.map(Point::from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConvertiblePointToStringConverter, DeclaredPointConverter, PointToStringConverter,
    };
    use crate::convert::{AttributeConverter, ConversionCounter};
    use crate::model::point::{ConvertiblePoint, Point};
    use crate::model::rect::RectVariant;
    use std::sync::Arc;

    #[test]
    fn both_declarations_write_the_same_string() {
        let counter = Arc::new(ConversionCounter::new());
        let point = Point::new(3, 12);

        let field = DeclaredPointConverter::for_variant(RectVariant::FieldConverted, &counter);
        let by_type = DeclaredPointConverter::for_variant(RectVariant::TypeConverted, &counter);

        assert_eq!(field.encode(Some(&point)).as_deref(), Some("3:12"));
        assert_eq!(by_type.encode(Some(&point)).as_deref(), Some("3:12"));
        assert_eq!(counter.to_datastore_calls(), 2);
    }

    #[test]
    fn type_declaration_decodes_back_to_point() {
        let counter = Arc::new(ConversionCounter::new());
        let converter = DeclaredPointConverter::for_variant(RectVariant::TypeConverted, &counter);

        let decoded = converter
            .decode(Some(&"-1:0".to_string()))
            .expect("decode should succeed");
        assert_eq!(decoded, Some(Point::new(-1, 0)));
        assert_eq!(counter.to_attribute_calls(), 1);
    }

    #[test]
    fn convertible_converter_counts_null_input() {
        let counter = Arc::new(ConversionCounter::new());
        let converter = ConvertiblePointToStringConverter::new(Arc::clone(&counter));

        assert_eq!(converter.to_datastore(None), None);
        assert_eq!(converter.to_attribute(None).expect("null decode"), None);
        assert_eq!(
            converter.to_datastore(Some(&ConvertiblePoint::from_parts(5, None))),
            Some("5:0".to_string())
        );
        assert_eq!(counter.to_datastore_calls(), 2);
        assert_eq!(counter.to_attribute_calls(), 1);
    }

    #[test]
    fn field_converter_shares_injected_counter() {
        let counter = Arc::new(ConversionCounter::new());
        let converter = PointToStringConverter::new(Arc::clone(&counter));
        assert!(Arc::ptr_eq(converter.counter(), &counter));
    }
}
