use pointconv_core::{
    AttributeConverter, ConversionCounter, ConvertError, ConvertiblePoint,
    ConvertiblePointToStringConverter, Point, PointToStringConverter,
};
use std::sync::Arc;

fn converters() -> (
    Arc<ConversionCounter>,
    PointToStringConverter,
    ConvertiblePointToStringConverter,
) {
    let counter = Arc::new(ConversionCounter::new());
    (
        Arc::clone(&counter),
        PointToStringConverter::new(Arc::clone(&counter)),
        ConvertiblePointToStringConverter::new(counter),
    )
}

#[test]
fn points_with_y_round_trip_through_storage_form() {
    let (_, point_converter, convertible_converter) = converters();

    for (x, y) in [(1, 10), (-7, 0), (i32::MAX, i32::MIN)] {
        let stored = point_converter.to_datastore(Some(&Point::new(x, y)));
        assert_eq!(stored, Some(format!("{x}:{y}")));
        assert_eq!(
            point_converter.to_attribute(stored.as_ref()).unwrap(),
            Some(Point::new(x, y))
        );

        let stored = convertible_converter.to_datastore(Some(&ConvertiblePoint::new(x, y)));
        assert_eq!(
            convertible_converter.to_attribute(stored.as_ref()).unwrap(),
            Some(ConvertiblePoint::new(x, y))
        );
    }
}

#[test]
fn absent_y_collapses_to_zero() {
    let (_, point_converter, _) = converters();

    let stored = point_converter.to_datastore(Some(&Point::without_y(4)));
    assert_eq!(stored.as_deref(), Some("4:0"));

    let decoded = point_converter.to_attribute(stored.as_ref()).unwrap();
    assert_eq!(decoded, Some(Point::new(4, 0)));
    assert_ne!(decoded, Some(Point::without_y(4)));
}

#[test]
fn none_maps_to_none_but_is_still_counted() {
    let (counter, point_converter, convertible_converter) = converters();

    assert_eq!(point_converter.to_datastore(None), None);
    assert_eq!(point_converter.to_attribute(None).unwrap(), None);
    assert_eq!(convertible_converter.to_datastore(None), None);
    assert_eq!(convertible_converter.to_attribute(None).unwrap(), None);

    assert_eq!(counter.to_datastore_calls(), 2);
    assert_eq!(counter.to_attribute_calls(), 2);
}

#[test]
fn wrong_segment_count_decodes_to_none() {
    let (_, point_converter, _) = converters();

    for malformed in ["5", "", "1:2:3", "3:", ":"] {
        assert_eq!(
            point_converter
                .to_attribute(Some(&malformed.to_string()))
                .unwrap(),
            None,
            "`{malformed}` should decode to none"
        );
    }
}

#[test]
fn non_integer_segments_fail() {
    let (counter, point_converter, convertible_converter) = converters();

    let err = point_converter
        .to_attribute(Some(&"a:b".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConvertError::InvalidInteger { segment: "x", .. }));

    let err = convertible_converter
        .to_attribute(Some(&"1:b".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConvertError::InvalidInteger { segment: "y", .. }));

    assert_eq!(counter.to_attribute_calls(), 2);
}

#[test]
fn counter_is_monotonic_across_calls() {
    let (counter, point_converter, _) = converters();
    let mut previous = counter.snapshot();

    for i in 0..5 {
        let stored = point_converter.to_datastore(Some(&Point::new(i, i)));
        point_converter.to_attribute(stored.as_ref()).unwrap();

        let current = counter.snapshot();
        let delta = current.delta_since(&previous);
        assert_eq!(delta.to_datastore, 1);
        assert_eq!(delta.to_attribute, 1);
        previous = current;
    }
}

#[test]
fn global_counter_is_one_shared_instance() {
    assert!(Arc::ptr_eq(
        &ConversionCounter::global(),
        &ConversionCounter::global()
    ));
}
