use docrow_core::db::schema::verify_record_table;
use docrow_core::{
    open_database, open_from_config, open_in_memory, open_in_memory_with, Book, Database,
    DatabaseConfig, DbError, Person, Record, RecordHeader,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BadTable {
    #[serde(flatten)]
    header: RecordHeader,
}

impl Record for BadTable {
    const KIND: &'static str = "bad";
    const TABLE: &'static str = "bad table; --";

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }
}

fn file_config(pool_size: u32) -> DatabaseConfig {
    DatabaseConfig {
        pool_size,
        ..DatabaseConfig::default()
    }
}

#[test]
fn in_memory_database_has_one_connection() {
    let db = open_in_memory_with(&file_config(8)).unwrap();
    assert_eq!(db.pool_size(), 1);
    assert_eq!(db.idle_connections(), 1);
}

#[test]
fn file_database_opens_pool_in_wal_mode() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_database(dir.path().join("docrow.sqlite3"), &file_config(3)).unwrap();
    assert_eq!(db.pool_size(), 3);

    let conn = db.acquire().unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode, "wal");
    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fk, 1);
    assert_eq!(db.idle_connections(), 2);
    drop(conn);
    assert_eq!(db.idle_connections(), 3);
}

#[test]
fn every_pooled_connection_is_bootstrapped() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_database(dir.path().join("docrow.sqlite3"), &file_config(3)).unwrap();

    let held: Vec<_> = (0..3).map(|_| db.acquire().unwrap()).collect();
    assert_eq!(db.idle_connections(), 0);
    for conn in &held {
        let hit: bool = conn
            .query_row(
                "SELECT json_contains('{\"a\":{\"b\":1,\"c\":2}}', '{\"a\":{\"b\":1}}');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(hit);
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}

#[test]
fn open_from_config_uses_path_when_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.sqlite3");
    let config = DatabaseConfig {
        path: Some(path.clone()),
        pool_size: 2,
        ..DatabaseConfig::default()
    };

    let db = open_from_config(&config).unwrap();
    assert_eq!(db.pool_size(), 2);
    assert!(path.exists());

    let memory = open_from_config(&DatabaseConfig::default()).unwrap();
    assert_eq!(memory.pool_size(), 1);
}

#[test]
fn register_creates_tables_idempotently() {
    let db = open_in_memory().unwrap();
    db.register::<Book>().unwrap();
    db.register::<Book>().unwrap();
    db.register::<Person>().unwrap();

    let conn = db.acquire().unwrap();
    verify_record_table(&conn, "book").unwrap();
    verify_record_table(&conn, "person").unwrap();
    let index: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'book_name_idx';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(index, 1);
}

#[test]
fn register_rejects_table_missing_record_columns() {
    let db = open_in_memory().unwrap();
    db.acquire()
        .unwrap()
        .execute_batch("CREATE TABLE book (id TEXT PRIMARY KEY, payload TEXT);")
        .unwrap();

    let err = db.register::<Book>().unwrap_err();
    match err {
        DbError::MissingRequiredColumn { table, column } => {
            assert_eq!(table, "book");
            assert_eq!(column, "name");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn register_rejects_unsafe_table_names() {
    let db = open_in_memory().unwrap();
    let err = db.register::<BadTable>().unwrap_err();
    assert!(matches!(err, DbError::InvalidTableName(name) if name == "bad table; --"));
}

#[test]
fn missing_table_is_reported() {
    let db = open_in_memory().unwrap();
    let conn = db.acquire().unwrap();
    let err = verify_record_table(&conn, "person").unwrap_err();
    assert!(matches!(err, DbError::MissingRequiredTable(name) if name == "person"));
}

#[test]
fn acquire_times_out_when_pool_is_exhausted() {
    let db: Database = open_in_memory_with(&DatabaseConfig {
        acquire_timeout_ms: 50,
        ..DatabaseConfig::default()
    })
    .unwrap();

    let held = db.acquire().unwrap();
    assert_eq!(format!("{held:?}"), "PooledConnection { autocommit: true }");
    let started = Instant::now();
    let err = db.acquire().unwrap_err();
    assert!(matches!(err, DbError::PoolTimeout { .. }));
    assert!(err.to_string().starts_with("no pooled connection became available"));
    assert!(started.elapsed() >= Duration::from_millis(40));

    drop(held);
    db.acquire().unwrap();
}

#[test]
fn connection_returned_mid_transaction_is_rolled_back() {
    let db = open_in_memory().unwrap();
    db.register::<Book>().unwrap();
    {
        let conn = db.acquire().unwrap();
        conn.execute_batch(
            "BEGIN; INSERT INTO book (id, name, created, modified, payload)
             VALUES ('x', 'x', 'c', 'm', '{}');",
        )
        .unwrap();
    }

    let conn = db.acquire().unwrap();
    assert!(conn.is_autocommit());
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM book;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}
