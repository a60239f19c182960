//! Connection bootstrap for file and in-memory databases.
//!
//! # Invariants
//! - Returned databases have `foreign_keys=ON` and a busy timeout on every
//!   connection.
//! - File databases run in WAL mode so readers do not block the writer.
//! - In-memory databases hold exactly one connection: each in-memory
//!   connection would otherwise be a separate, empty database.

use super::pool::ConnectionPool;
use super::{Database, DbResult};
use crate::config::DatabaseConfig;
use crate::repo::filter::register_sql_functions;
use log::{error, info};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (creating if needed) the database file at `path` with a pool of
/// `config.pool_size` connections.
pub fn open_database(path: impl AsRef<Path>, config: &DatabaseConfig) -> DbResult<Database> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file pool_size={}",
        config.pool_size
    );

    let manager = SqliteConnectionManager::file(path.as_ref()).with_init(bootstrap(config, true));
    let result = ConnectionPool::build(
        manager,
        config.pool_size,
        Duration::from_millis(config.acquire_timeout_ms),
    );
    finish_open("file", started_at, result)
}

/// Opens a private in-memory database with default settings.
pub fn open_in_memory() -> DbResult<Database> {
    open_in_memory_with(&DatabaseConfig::default())
}

/// Opens a private in-memory database. `pool_size` is ignored (always 1).
pub fn open_in_memory_with(config: &DatabaseConfig) -> DbResult<Database> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory pool_size=1");

    let manager = SqliteConnectionManager::memory().with_init(bootstrap(config, false));
    let result = ConnectionPool::build(
        manager,
        1,
        Duration::from_millis(config.acquire_timeout_ms),
    );
    finish_open("memory", started_at, result)
}

/// Opens the database described by `config` (in-memory when `path` is unset).
pub fn open_from_config(config: &DatabaseConfig) -> DbResult<Database> {
    match &config.path {
        Some(path) => open_database(path, config),
        None => open_in_memory_with(config),
    }
}

fn finish_open(
    mode: &str,
    started_at: Instant,
    result: DbResult<ConnectionPool>,
) -> DbResult<Database> {
    match result {
        Ok(pool) => {
            info!(
                "event=db_open module=db status=ok mode={} pool_size={} duration_ms={}",
                mode,
                pool.size(),
                started_at.elapsed().as_millis()
            );
            Ok(Database::from_pool(pool))
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Per-connection setup run by the pool each time it opens a connection.
fn bootstrap(
    config: &DatabaseConfig,
    file_backed: bool,
) -> impl Fn(&mut Connection) -> rusqlite::Result<()> + Send + Sync + 'static {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    move |conn| {
        // Set first: concurrent WAL switches on a fresh file wait instead of failing.
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if file_backed {
            let _mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        }
        register_sql_functions(conn)
    }
}
