//! Point attribute conversion over a SQLite-backed rect store.
//! Counts every conversion so persistence paths can be checked call by call.

pub mod convert;
pub mod db;
pub mod harness;
pub mod logging;
pub mod model;
pub mod store;

pub use convert::{
    AttributeConverter, ConversionCounter, ConvertError, ConvertResult,
    ConvertiblePointToStringConverter, CounterDelta, CounterSnapshot, DeclaredPointConverter,
    PointToStringConverter,
};
pub use harness::{ConversionHarness, HarnessError, HarnessResult, Scenario, ScenarioReport};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::point::{ConvertiblePoint, Point};
pub use model::rect::{Rect, RectField, RectId, RectVariant};
pub use store::{
    EntityStore, QueryValue, RectQuery, SqliteSession, SqliteStoreFactory, StoreConfig,
    StoreError, StoreFactory, StoreLocation, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
