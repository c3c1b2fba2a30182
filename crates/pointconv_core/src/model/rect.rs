//! Rect entity holding two converted point fields.
//!
//! # Responsibility
//! - Model the persisted rectangle shape shared by both declaration variants.
//! - Defer datastore-to-attribute conversion until a field is first read.
//! - Track which fields were replaced while the entity is persistent.
//!
//! # Invariants
//! - `Rect` is a shared handle: clones refer to the same instance.
//! - Reading one field never converts the other.
//! - A field is converted at most once per load; later reads are cached.
//! - The committed column text of each field is remembered, so the store
//!   can publish it without converting again.

use crate::convert::{ConvertResult, DeclaredPointConverter};
use crate::model::point::Point;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use uuid::Uuid;

/// Stable identity assigned by the store on first persist.
pub type RectId = Uuid;

/// Where the point conversion is declared for a rect class.
///
/// The store mapping layer uses the tag to select storage and the accepted
/// query parameter type. Everything else behaves identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RectVariant {
    /// Converter declared on each `Point` field.
    FieldConverted,
    /// Converter declared on the `ConvertiblePoint` type.
    TypeConverted,
}

impl RectVariant {
    pub const ALL: [RectVariant; 2] = [RectVariant::FieldConverted, RectVariant::TypeConverted];

    /// Stable label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldConverted => "field_converted",
            Self::TypeConverted => "type_converted",
        }
    }

    pub(crate) fn table_name(self) -> &'static str {
        match self {
            Self::FieldConverted => "rect_field_converted",
            Self::TypeConverted => "rect_type_converted",
        }
    }
}

/// Converted point field of a rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RectField {
    UpperLeft,
    LowerRight,
}

impl RectField {
    pub const ALL: [RectField; 2] = [RectField::UpperLeft, RectField::LowerRight];

    /// Field name as referenced by query filters.
    pub fn filter_name(self) -> &'static str {
        match self {
            Self::UpperLeft => "upperLeft",
            Self::LowerRight => "lowerRight",
        }
    }

    pub fn parse_filter_name(value: &str) -> Option<Self> {
        match value {
            "upperLeft" => Some(Self::UpperLeft),
            "lowerRight" => Some(Self::LowerRight),
            _ => None,
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::UpperLeft => "upper_left",
            Self::LowerRight => "lower_right",
        }
    }
}

/// Field value as the store sees it when writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldValue {
    /// Attribute form; writing it requires a conversion.
    Loaded(Option<Point>),
    /// Datastore form that has not been read yet.
    Raw(Option<String>),
}

#[derive(Debug)]
enum PointSlot {
    Loaded(Option<Point>),
    Stored {
        raw: Option<String>,
        converter: DeclaredPointConverter,
    },
}

impl PointSlot {
    fn field_value(&self) -> FieldValue {
        match self {
            Self::Loaded(point) => FieldValue::Loaded(*point),
            Self::Stored { raw, .. } => FieldValue::Raw(raw.clone()),
        }
    }
}

#[derive(Debug)]
struct RectState {
    variant: RectVariant,
    id: Option<RectId>,
    upper_left: PointSlot,
    lower_right: PointSlot,
    dirty: BTreeSet<RectField>,
    committed: BTreeMap<RectField, Option<String>>,
}

impl RectState {
    fn slot_mut(&mut self, field: RectField) -> &mut PointSlot {
        match field {
            RectField::UpperLeft => &mut self.upper_left,
            RectField::LowerRight => &mut self.lower_right,
        }
    }

    fn slot(&self, field: RectField) -> &PointSlot {
        match field {
            RectField::UpperLeft => &self.upper_left,
            RectField::LowerRight => &self.lower_right,
        }
    }
}

/// Rectangle entity with `upper_left` and `lower_right` point fields.
#[derive(Debug, Clone)]
pub struct Rect {
    state: Rc<RefCell<RectState>>,
}

impl Rect {
    /// Creates a transient rect with both fields unset.
    pub fn new(variant: RectVariant) -> Self {
        Self::from_state(RectState {
            variant,
            id: None,
            upper_left: PointSlot::Loaded(None),
            lower_right: PointSlot::Loaded(None),
            dirty: BTreeSet::new(),
            committed: BTreeMap::new(),
        })
    }

    /// Creates a managed rect from stored column text; fields are converted
    /// on first read.
    pub(crate) fn managed(
        variant: RectVariant,
        id: RectId,
        upper_left: Option<String>,
        lower_right: Option<String>,
        converter: &DeclaredPointConverter,
    ) -> Self {
        let slot = |raw: Option<String>| PointSlot::Stored {
            raw,
            converter: converter.clone(),
        };
        let committed = BTreeMap::from([
            (RectField::UpperLeft, upper_left.clone()),
            (RectField::LowerRight, lower_right.clone()),
        ]);
        Self::from_state(RectState {
            variant,
            id: Some(id),
            upper_left: slot(upper_left),
            lower_right: slot(lower_right),
            dirty: BTreeSet::new(),
            committed,
        })
    }

    fn from_state(state: RectState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn variant(&self) -> RectVariant {
        self.state.borrow().variant
    }

    /// Returns the store identity, or `None` while transient.
    pub fn id(&self) -> Option<RectId> {
        self.state.borrow().id
    }

    pub fn is_persistent(&self) -> bool {
        self.id().is_some()
    }

    /// Returns whether a persistent rect has unflushed field changes.
    pub fn is_dirty(&self) -> bool {
        !self.state.borrow().dirty.is_empty()
    }

    /// Returns whether both handles refer to the same entity instance.
    pub fn same_instance(&self, other: &Rect) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn upper_left(&self) -> ConvertResult<Option<Point>> {
        self.point(RectField::UpperLeft)
    }

    pub fn lower_right(&self) -> ConvertResult<Option<Point>> {
        self.point(RectField::LowerRight)
    }

    pub fn set_upper_left(&self, point: Option<Point>) {
        self.set_point(RectField::UpperLeft, point);
    }

    pub fn set_lower_right(&self, point: Option<Point>) {
        self.set_point(RectField::LowerRight, point);
    }

    /// Reads one field, converting the stored value on first access.
    ///
    /// A failed conversion leaves the stored value in place.
    pub fn point(&self, field: RectField) -> ConvertResult<Option<Point>> {
        let mut state = self.state.borrow_mut();
        let slot = state.slot_mut(field);
        let decoded = match slot {
            PointSlot::Loaded(point) => return Ok(*point),
            PointSlot::Stored { raw, converter } => converter.decode(raw.as_ref())?,
        };
        *slot = PointSlot::Loaded(decoded);
        Ok(decoded)
    }

    /// Replaces one field; persistent rects record the field as dirty.
    pub fn set_point(&self, field: RectField, point: Option<Point>) {
        let mut state = self.state.borrow_mut();
        *state.slot_mut(field) = PointSlot::Loaded(point);
        if state.id.is_some() {
            state.dirty.insert(field);
        }
    }

    pub(crate) fn field_value(&self, field: RectField) -> FieldValue {
        self.state.borrow().slot(field).field_value()
    }

    pub(crate) fn dirty_fields(&self) -> Vec<RectField> {
        self.state.borrow().dirty.iter().copied().collect()
    }

    /// Column text of `field` as last committed, if known.
    pub(crate) fn committed_value(&self, field: RectField) -> Option<Option<String>> {
        self.state.borrow().committed.get(&field).cloned()
    }

    pub(crate) fn record_committed(&self, field: RectField, raw: Option<String>) {
        self.state.borrow_mut().committed.insert(field, raw);
    }

    pub(crate) fn mark_persistent(&self, id: RectId) {
        let mut state = self.state.borrow_mut();
        state.id = Some(id);
        state.dirty.clear();
    }

    pub(crate) fn clear_dirty(&self) {
        self.state.borrow_mut().dirty.clear();
    }

    pub(crate) fn mark_transient(&self) {
        let mut state = self.state.borrow_mut();
        state.id = None;
        state.dirty.clear();
        state.committed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Rect, RectField, RectVariant};
    use crate::convert::{ConversionCounter, DeclaredPointConverter};
    use crate::model::point::Point;
    use std::sync::Arc;
    use uuid::Uuid;

    fn stored_rect(counter: &Arc<ConversionCounter>, upper: &str, lower: &str) -> Rect {
        let converter = DeclaredPointConverter::for_variant(RectVariant::FieldConverted, counter);
        Rect::managed(
            RectVariant::FieldConverted,
            Uuid::new_v4(),
            Some(upper.to_string()),
            Some(lower.to_string()),
            &converter,
        )
    }

    #[test]
    fn transient_rect_is_never_dirty() {
        let rect = Rect::new(RectVariant::TypeConverted);
        rect.set_upper_left(Some(Point::new(1, 10)));
        assert!(!rect.is_persistent());
        assert!(!rect.is_dirty());
        assert_eq!(rect.upper_left().expect("read"), Some(Point::new(1, 10)));
    }

    #[test]
    fn stored_field_is_converted_once_on_first_read() {
        let counter = Arc::new(ConversionCounter::new());
        let rect = stored_rect(&counter, "1:10", "10:1");
        assert_eq!(counter.to_attribute_calls(), 0);

        assert_eq!(rect.upper_left().expect("read"), Some(Point::new(1, 10)));
        assert_eq!(rect.upper_left().expect("read"), Some(Point::new(1, 10)));
        assert_eq!(counter.to_attribute_calls(), 1);

        assert_eq!(rect.lower_right().expect("read"), Some(Point::new(10, 1)));
        assert_eq!(counter.to_attribute_calls(), 2);
    }

    #[test]
    fn failed_conversion_is_retried_on_next_read() {
        let counter = Arc::new(ConversionCounter::new());
        let rect = stored_rect(&counter, "a:b", "10:1");

        assert!(rect.upper_left().is_err());
        assert!(rect.upper_left().is_err());
        assert_eq!(counter.to_attribute_calls(), 2);
    }

    #[test]
    fn setting_persistent_field_marks_only_that_field_dirty() {
        let counter = Arc::new(ConversionCounter::new());
        let rect = stored_rect(&counter, "1:10", "10:1");
        rect.set_lower_right(Some(Point::new(11, 2)));

        assert!(rect.is_dirty());
        assert_eq!(rect.dirty_fields(), vec![RectField::LowerRight]);
        assert_eq!(
            rect.field_value(RectField::UpperLeft),
            FieldValue::Raw(Some("1:10".to_string()))
        );
    }

    #[test]
    fn committed_text_survives_reads_and_unflushed_writes() {
        let counter = Arc::new(ConversionCounter::new());
        let rect = stored_rect(&counter, "3:0", "10:1");
        rect.upper_left().expect("read");
        rect.set_upper_left(Some(Point::without_y(7)));

        assert_eq!(
            rect.committed_value(RectField::UpperLeft),
            Some(Some("3:0".to_string()))
        );
        rect.record_committed(RectField::UpperLeft, Some("7:0".to_string()));
        assert_eq!(
            rect.committed_value(RectField::UpperLeft),
            Some(Some("7:0".to_string()))
        );
        let transient = Rect::new(RectVariant::FieldConverted);
        assert_eq!(transient.committed_value(RectField::UpperLeft), None);
    }

    #[test]
    fn clones_share_the_same_instance() {
        let rect = Rect::new(RectVariant::FieldConverted);
        let alias = rect.clone();
        alias.set_upper_left(Some(Point::new(5, 5)));

        assert!(rect.same_instance(&alias));
        assert_eq!(rect.upper_left().expect("read"), Some(Point::new(5, 5)));
    }
}
