//! SQLite-backed rect store.
//!
//! # Responsibility
//! - Open sessions over a migrated database and share one second-level cache.
//! - Convert point fields on insert, flush, and parameter binding.
//! - Hand out lazily materialized `Rect` handles on reads and queries.
//!
//! # Invariants
//! - A session owns at most one connection; `close` always releases it.
//! - Dirty managed rects are written back only on `commit`.
//! - Cache entries are published only after a successful commit and hold the
//!   column text that commit wrote.

use super::cache::{CachedRect, LevelTwoCache};
use super::query::{point_parameter_type, Operand, QueryError, QueryValue, RectQuery};
use super::{EntityStore, StoreConfig, StoreError, StoreFactory, StoreLocation, StoreResult};
use crate::convert::{
    AttributeConverter, ConversionCounter, ConvertiblePointToStringConverter,
    DeclaredPointConverter, PointToStringConverter,
};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_shared_memory};
use crate::model::rect::{FieldValue, Rect, RectField, RectId, RectVariant};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type RawRow = (String, Option<String>, Option<String>);

/// Column text written for one field in the open transaction.
struct WrittenField {
    rect: Rect,
    field: RectField,
    raw: Option<String>,
}

/// Factory for SQLite sessions sharing one cache and one counter.
pub struct SqliteStoreFactory {
    config: StoreConfig,
    cache: Arc<LevelTwoCache>,
    counter: Arc<ConversionCounter>,
    // Keeps a shared in-memory database alive between sessions.
    _anchor: Option<Connection>,
}

impl SqliteStoreFactory {
    /// Opens the configured database once, applying migrations.
    ///
    /// # Errors
    /// - Returns `StoreError::Db` when the database cannot be opened or migrated.
    pub fn open(config: StoreConfig, counter: Arc<ConversionCounter>) -> StoreResult<Self> {
        let conn = connect(&config.location)?;
        let anchor = match config.location {
            StoreLocation::File(_) => None,
            StoreLocation::SharedMemory(_) => Some(conn),
        };
        info!(
            "event=store_open module=store status=ok level_two_cache={}",
            config.level_two_cache
        );

        Ok(Self {
            cache: Arc::new(LevelTwoCache::new(config.level_two_cache)),
            config,
            counter,
            _anchor: anchor,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn counter(&self) -> &Arc<ConversionCounter> {
        &self.counter
    }

    /// Number of rects currently held by the second-level cache.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl StoreFactory for SqliteStoreFactory {
    type Session = SqliteSession;

    fn open_session(&self) -> StoreResult<SqliteSession> {
        let conn = connect(&self.config.location)?;
        debug!("event=session_open module=store status=ok");
        Ok(SqliteSession {
            conn: Some(conn),
            cache: Arc::clone(&self.cache),
            counter: Arc::clone(&self.counter),
            managed: HashMap::new(),
            created: Vec::new(),
            written: Vec::new(),
        })
    }

    fn evict_all(&self, variant: RectVariant) {
        self.cache.evict_all(variant);
    }
}

/// One SQLite connection plus the rects it manages.
pub struct SqliteSession {
    conn: Option<Connection>,
    cache: Arc<LevelTwoCache>,
    counter: Arc<ConversionCounter>,
    managed: HashMap<(RectVariant, RectId), Rect>,
    created: Vec<Rect>,
    written: Vec<WrittenField>,
}

impl SqliteSession {
    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn active_conn(&self) -> StoreResult<&Connection> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Err(StoreError::TransactionNotActive);
        }
        Ok(conn)
    }

    fn converter(&self, variant: RectVariant) -> DeclaredPointConverter {
        DeclaredPointConverter::for_variant(variant, &self.counter)
    }

    fn datastore_value(converter: &DeclaredPointConverter, value: FieldValue) -> Option<String> {
        match value {
            FieldValue::Loaded(point) => converter.encode(point.as_ref()),
            FieldValue::Raw(raw) => raw,
        }
    }

    /// Returns the managed instance for a row, creating it when unseen.
    fn materialize(&mut self, variant: RectVariant, row: RawRow) -> StoreResult<Rect> {
        let (id_text, upper_left, lower_right) = row;
        let id = Uuid::parse_str(&id_text).map_err(|_| {
            StoreError::InvalidData(format!(
                "invalid id `{id_text}` in {}.id",
                variant.table_name()
            ))
        })?;
        if let Some(rect) = self.managed.get(&(variant, id)) {
            return Ok(rect.clone());
        }

        let rect = Rect::managed(variant, id, upper_left, lower_right, &self.converter(variant));
        self.managed.insert((variant, id), rect.clone());
        Ok(rect)
    }

    /// Converts a bound operand to the string compared against the column.
    fn bind_operand(&self, variant: RectVariant, operand: Operand) -> StoreResult<Option<String>> {
        match operand {
            Operand::Literal(text) => Ok(Some(text)),
            Operand::Value {
                value: QueryValue::Text(text),
                ..
            } => Ok(Some(text)),
            Operand::Value {
                value: QueryValue::Point(point),
                ..
            } if variant == RectVariant::FieldConverted => {
                let converter = PointToStringConverter::new(Arc::clone(&self.counter));
                Ok(converter.to_datastore(Some(&point)))
            }
            Operand::Value {
                value: QueryValue::ConvertiblePoint(point),
                ..
            } if variant == RectVariant::TypeConverted => {
                let converter = ConvertiblePointToStringConverter::new(Arc::clone(&self.counter));
                Ok(converter.to_datastore(Some(&point)))
            }
            Operand::Value { parameter, value } => Err(QueryError::ParameterType {
                parameter,
                expected: point_parameter_type(variant),
                actual: value.type_name(),
            }
            .into()),
        }
    }

    /// Writes back every dirty field of the managed rects.
    fn flush(&self) -> StoreResult<Vec<WrittenField>> {
        let conn = self.active_conn()?;
        let mut written = Vec::new();
        for ((variant, id), rect) in &self.managed {
            let dirty = rect.dirty_fields();
            if dirty.is_empty() {
                continue;
            }
            let converter = self.converter(*variant);
            for field in dirty {
                let raw = Self::datastore_value(&converter, rect.field_value(field));
                conn.execute(
                    &format!(
                        "UPDATE {} SET {} = ?1 WHERE id = ?2;",
                        variant.table_name(),
                        field.column()
                    ),
                    params![raw, id.to_string()],
                )?;
                written.push(WrittenField {
                    rect: rect.clone(),
                    field,
                    raw,
                });
            }
            debug!(
                "event=rect_flush module=store variant={} id={id}",
                variant.as_str()
            );
        }
        Ok(written)
    }

    /// Records committed column text on each rect and refreshes the cache.
    fn publish(&self, written: Vec<WrittenField>) -> usize {
        let mut touched: Vec<Rect> = Vec::new();
        for WrittenField { rect, field, raw } in written {
            rect.record_committed(field, raw);
            if !touched.iter().any(|seen| seen.same_instance(&rect)) {
                touched.push(rect);
            }
        }

        for rect in &touched {
            rect.clear_dirty();
            let Some(id) = rect.id() else {
                continue;
            };
            let upper_left = rect.committed_value(RectField::UpperLeft);
            let lower_right = rect.committed_value(RectField::LowerRight);
            match (upper_left, lower_right) {
                (Some(upper_left), Some(lower_right)) => self.cache.put(
                    rect.variant(),
                    id,
                    CachedRect {
                        upper_left,
                        lower_right,
                    },
                ),
                _ => self.cache.remove(rect.variant(), id),
            }
        }
        touched.len()
    }

    /// Forgets transaction-local state after a rollback.
    fn discard_transaction_state(&mut self) {
        self.written.clear();
        for rect in self.created.drain(..) {
            if let Some(id) = rect.id() {
                self.managed.remove(&(rect.variant(), id));
            }
            rect.mark_transient();
        }
        self.managed.retain(|_, rect| {
            let keep = !rect.is_dirty();
            if !keep {
                rect.clear_dirty();
            }
            keep
        });
    }

    fn select_rows(
        conn: &Connection,
        sql: &str,
        bind: Option<&str>,
    ) -> StoreResult<Vec<RawRow>> {
        let mut stmt = conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        };
        let rows = match bind {
            Some(value) => stmt.query_map([value], map_row)?,
            None => stmt.query_map([], map_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl EntityStore for SqliteSession {
    fn begin(&mut self) -> StoreResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            return Err(StoreError::TransactionAlreadyActive);
        }
        conn.execute_batch("BEGIN;")?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let flushed = match self.flush() {
            Ok(written) => written,
            Err(err) => {
                if self.is_active() {
                    warn!("event=tx_commit module=store status=error action=rollback error={err}");
                    self.rollback()?;
                }
                return Err(err);
            }
        };
        self.active_conn()?.execute_batch("COMMIT;")?;

        self.created.clear();
        let mut written = std::mem::take(&mut self.written);
        written.extend(flushed);
        let touched = self.publish(written);
        debug!("event=tx_commit module=store status=ok written={touched}");
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.active_conn()?.execute_batch("ROLLBACK;")?;
        self.discard_transaction_state();
        debug!("event=tx_rollback module=store status=ok");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    fn make_persistent(&mut self, rect: &Rect) -> StoreResult<RectId> {
        if let Some(id) = rect.id() {
            return Err(StoreError::AlreadyPersistent(id));
        }
        let variant = rect.variant();
        let converter = self.converter(variant);
        let conn = self.active_conn()?;

        let id = Uuid::new_v4();
        let upper_left =
            Self::datastore_value(&converter, rect.field_value(RectField::UpperLeft));
        let lower_right =
            Self::datastore_value(&converter, rect.field_value(RectField::LowerRight));
        conn.execute(
            &format!(
                "INSERT INTO {} (id, upper_left, lower_right) VALUES (?1, ?2, ?3);",
                variant.table_name()
            ),
            params![id.to_string(), upper_left, lower_right],
        )?;

        rect.mark_persistent(id);
        self.managed.insert((variant, id), rect.clone());
        self.created.push(rect.clone());
        self.written.push(WrittenField {
            rect: rect.clone(),
            field: RectField::UpperLeft,
            raw: upper_left,
        });
        self.written.push(WrittenField {
            rect: rect.clone(),
            field: RectField::LowerRight,
            raw: lower_right,
        });
        debug!(
            "event=rect_persist module=store variant={} id={id}",
            variant.as_str()
        );
        Ok(id)
    }

    fn object_id(&self, rect: &Rect) -> Option<RectId> {
        rect.id()
    }

    fn get_object_by_id(&mut self, variant: RectVariant, id: RectId) -> StoreResult<Rect> {
        let conn = self.conn()?;
        if let Some(rect) = self.managed.get(&(variant, id)) {
            return Ok(rect.clone());
        }

        let converter = self.converter(variant);
        let rect = if let Some(cached) = self.cache.get(variant, id) {
            debug!(
                "event=rect_load module=store source=cache variant={} id={id}",
                variant.as_str()
            );
            Rect::managed(variant, id, cached.upper_left, cached.lower_right, &converter)
        } else {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT upper_left, lower_right FROM {} WHERE id = ?1;",
                        variant.table_name()
                    ),
                    [id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((upper_left, lower_right)) = row else {
                return Err(StoreError::NotFound { variant, id });
            };
            debug!(
                "event=rect_load module=store source=datastore variant={} id={id}",
                variant.as_str()
            );
            Rect::managed(variant, id, upper_left, lower_right, &converter)
        };

        self.managed.insert((variant, id), rect.clone());
        Ok(rect)
    }

    fn query(&mut self, query: &RectQuery) -> StoreResult<Vec<Rect>> {
        let variant = query.variant();
        let resolved = query.resolve()?;
        let bound = self.bind_operand(variant, resolved.operand)?;
        let conn = self.conn()?;

        let rows = match bound {
            Some(value) => Self::select_rows(
                conn,
                &format!(
                    "SELECT id, upper_left, lower_right FROM {} WHERE {} = ?1 ORDER BY created_at, id;",
                    variant.table_name(),
                    resolved.field.column()
                ),
                Some(value.as_str()),
            )?,
            None => Vec::new(),
        };
        debug!(
            "event=rect_query module=store variant={} field={} rows={}",
            variant.as_str(),
            resolved.field.filter_name(),
            rows.len()
        );

        rows.into_iter()
            .map(|row| self.materialize(variant, row))
            .collect()
    }

    fn extent(&mut self, variant: RectVariant) -> StoreResult<Vec<Rect>> {
        let rows = Self::select_rows(
            self.conn()?,
            &format!(
                "SELECT id, upper_left, lower_right FROM {} ORDER BY created_at, id;",
                variant.table_name()
            ),
            None,
        )?;
        rows.into_iter()
            .map(|row| self.materialize(variant, row))
            .collect()
    }

    fn delete_persistent_all(&mut self, rects: &[Rect]) -> StoreResult<()> {
        let targets: Vec<(&Rect, RectVariant, RectId)> = rects
            .iter()
            .filter_map(|rect| rect.id().map(|id| (rect, rect.variant(), id)))
            .collect();

        let conn = self.active_conn()?;
        for (_, variant, id) in &targets {
            conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1;", variant.table_name()),
                [id.to_string()],
            )?;
        }

        for (rect, variant, id) in targets {
            self.cache.remove(variant, id);
            self.managed.remove(&(variant, id));
            self.created.retain(|created| !created.same_instance(rect));
            self.written.retain(|written| !written.rect.same_instance(rect));
            rect.mark_transient();
        }
        debug!(
            "event=rect_delete module=store status=ok count={}",
            rects.len()
        );
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }
        let rollback_result = if self.is_active() {
            self.rollback()
        } else {
            Ok(())
        };

        self.managed.clear();
        self.created.clear();
        self.written.clear();
        let close_result = match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| StoreError::from(err)),
            None => Ok(()),
        };
        debug!("event=session_close module=store status=ok");
        rollback_result.and(close_result)
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("event=session_close module=store status=error error={err}");
        }
    }
}

fn connect(location: &StoreLocation) -> StoreResult<Connection> {
    let conn = match location {
        StoreLocation::File(path) => open_db(path)?,
        StoreLocation::SharedMemory(name) => open_db_shared_memory(name)?,
    };
    ensure_connection_ready(&conn)?;
    Ok(conn)
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for variant in RectVariant::ALL {
        let table = variant.table_name();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
