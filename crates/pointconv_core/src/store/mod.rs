//! Entity store boundary and the bundled SQLite implementation.
//!
//! # Responsibility
//! - Define the session and factory contracts the harness drives.
//! - Map rect fields to datastore columns through the point converters.
//!
//! # Invariants
//! - Writes require an active transaction.
//! - Loaded rows keep point columns unconverted until a field is read.
//! - Query results are always read from the datastore, never the cache.
//!
//! # See also
//! - `crate::harness` for the operation sequences run against a store.

use crate::convert::ConvertError;
use crate::db::DbError;
use crate::model::rect::{Rect, RectId, RectVariant};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod cache;
pub mod query;
mod sqlite;

pub use query::{point_parameter_type, QueryError, QueryResult, QueryValue, RectQuery};
pub use sqlite::{SqliteSession, SqliteStoreFactory};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store sessions and factories.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// A stored point could not be converted back.
    Convert(ConvertError),
    Query(QueryError),
    NotFound {
        variant: RectVariant,
        id: RectId,
    },
    /// Operation needs `begin()` first.
    TransactionNotActive,
    TransactionAlreadyActive,
    /// Session was closed; open a new one.
    Closed,
    /// `make_persistent` was called on an entity that already has an id.
    AlreadyPersistent(RectId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Convert(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::NotFound { variant, id } => {
                write!(f, "rect not found: {} {id}", variant.as_str())
            }
            Self::TransactionNotActive => write!(f, "no active transaction"),
            Self::TransactionAlreadyActive => write!(f, "transaction already active"),
            Self::Closed => write!(f, "store session is closed"),
            Self::AlreadyPersistent(id) => write!(f, "rect is already persistent: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "rect store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "rect store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted rect data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Convert(err) => Some(err),
            Self::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConvertError> for StoreError {
    fn from(value: ConvertError) -> Self {
        Self::Convert(value)
    }
}

impl From<QueryError> for StoreError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    /// Named in-memory database kept alive by the factory.
    SharedMemory(String),
}

/// Store factory configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Enables the second-level cache shared across sessions.
    pub level_two_cache: bool,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    pub fn shared_memory(name: impl Into<String>) -> Self {
        Self {
            location: StoreLocation::SharedMemory(name.into()),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::SharedMemory("pointconv".to_string()),
            level_two_cache: true,
        }
    }
}

/// One unit-of-work session over the store.
///
/// Entities returned by a session stay managed by it until it closes:
/// field changes are written back on `commit`.
pub trait EntityStore {
    fn begin(&mut self) -> StoreResult<()>;
    /// Writes back dirty managed entities, then commits.
    fn commit(&mut self) -> StoreResult<()>;
    fn rollback(&mut self) -> StoreResult<()>;
    fn is_active(&self) -> bool;

    /// Converts both point fields and inserts the entity.
    fn make_persistent(&mut self, rect: &Rect) -> StoreResult<RectId>;
    fn object_id(&self, rect: &Rect) -> Option<RectId>;
    fn get_object_by_id(&mut self, variant: RectVariant, id: RectId) -> StoreResult<Rect>;
    fn query(&mut self, query: &RectQuery) -> StoreResult<Vec<Rect>>;
    /// Enumerates every persisted instance of `variant`.
    fn extent(&mut self, variant: RectVariant) -> StoreResult<Vec<Rect>>;
    fn delete_persistent_all(&mut self, rects: &[Rect]) -> StoreResult<()>;

    /// Rolls back an active transaction and releases the connection.
    fn close(&mut self) -> StoreResult<()>;
    fn is_closed(&self) -> bool;
}

/// Source of sessions plus the shared cache they use.
pub trait StoreFactory {
    type Session: EntityStore;

    fn open_session(&self) -> StoreResult<Self::Session>;
    /// Drops every cached instance of `variant`.
    fn evict_all(&self, variant: RectVariant);
}
