use pointconv_core::db::migrations::{current_user_version, latest_version};
use pointconv_core::db::{open_db, open_db_in_memory, open_db_shared_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "rect_field_converted");
    assert_table_exists(&conn, "rect_type_converted");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rects.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO rect_field_converted (id, upper_left, lower_right) VALUES ('a', '1:10', '10:1');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(current_user_version(&conn_second).unwrap(), latest_version());
    let rows: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM rect_field_converted;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn shared_memory_connections_see_each_other() {
    let name = format!("db-migrations-{}", uuid::Uuid::new_v4());
    let anchor = open_db_shared_memory(&name).unwrap();
    anchor
        .execute(
            "INSERT INTO rect_type_converted (id, upper_left, lower_right) VALUES ('b', '2:11', '11:2');",
            [],
        )
        .unwrap();

    let other = open_db_shared_memory(&name).unwrap();
    let upper_left: String = other
        .query_row(
            "SELECT upper_left FROM rect_type_converted WHERE id = 'b';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(upper_left, "2:11");
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "expected table `{table_name}` to exist");
}

#[test]
fn open_failure_names_the_database_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("rects.db");

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Open { location, .. } => assert_eq!(location, &path.display().to_string()),
        other => panic!("expected open error, got {other:?}"),
    }
    assert!(err.to_string().contains("rects.db"));
    assert!(std::error::Error::source(&err).is_some());
}
