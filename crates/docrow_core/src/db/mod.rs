//! SQLite storage bootstrap: connections, pooling and record tables.
//!
//! # Responsibility
//! - Open and configure SQLite connections (pragmas, SQL functions).
//! - Share a bounded connection pool through the cloneable `Database` handle.
//! - Create and verify one table per registered record type.
//!
//! # Invariants
//! - Every pooled connection has `json_contains` registered.
//! - `Database` is constructed explicitly and injected; there is no global.

use crate::model::record::Record;
use log::info;
use thiserror::Error;

mod open;
mod pool;
pub mod schema;

pub use open::{open_database, open_from_config, open_in_memory, open_in_memory_with};
pub use pool::PooledConnection;

use pool::ConnectionPool;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),
    #[error("required table `{0}` is missing")]
    MissingRequiredTable(String),
    #[error("required column `{column}` is missing from table `{table}`")]
    MissingRequiredColumn { table: String, column: &'static str },
    #[error("open connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("no pooled connection became available within {waited_ms} ms: {source}")]
    PoolTimeout {
        waited_ms: u128,
        #[source]
        source: r2d2::Error,
    },
}

/// Handle to one logical database, cheap to clone and safe to share
/// between threads.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub(crate) fn from_pool(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Creates (if needed) and verifies the table backing record type `R`.
    pub fn register<R: Record>(&self) -> DbResult<()> {
        let conn = self.acquire()?;
        schema::ensure_record_table(&conn, R::TABLE)?;
        info!(
            "event=table_register module=db status=ok kind={} table={}",
            R::KIND,
            R::TABLE
        );
        Ok(())
    }

    /// Checks out a connection, waiting up to the configured acquire timeout.
    pub fn acquire(&self) -> DbResult<PooledConnection> {
        self.pool.acquire()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Connections currently checked in.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.size())
            .field("idle", &self.pool.idle())
            .finish()
    }
}
