//! Connection pool over `r2d2` and `r2d2_sqlite`.
//!
//! Connections are checked out exclusively and returned on drop. A returned
//! connection that is still inside a transaction is rolled back first so the
//! next borrower always starts in autocommit mode.

use super::{DbError, DbResult};
use log::warn;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Lower bound on how long `build` waits for the initial connections.
const MIN_OPEN_WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub(crate) struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Builds a pool of exactly `size` connections, all opened up front.
    ///
    /// Connections are never retired for idleness or age: an in-memory
    /// database lives only as long as its one connection.
    pub(crate) fn build(
        manager: SqliteConnectionManager,
        size: u32,
        acquire_timeout: Duration,
    ) -> DbResult<Self> {
        let size = size.max(1);
        let pool = Pool::builder()
            .max_size(size)
            .min_idle(Some(size))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(acquire_timeout.max(MIN_OPEN_WAIT))
            .build(manager)?;
        Ok(Self {
            pool,
            acquire_timeout,
        })
    }

    pub(crate) fn acquire(&self) -> DbResult<PooledConnection> {
        let started = Instant::now();
        let conn = self
            .pool
            .get_timeout(self.acquire_timeout)
            .map_err(|source| DbError::PoolTimeout {
                waited_ms: started.elapsed().as_millis(),
                source,
            })?;
        Ok(PooledConnection { conn })
    }

    pub(crate) fn size(&self) -> usize {
        self.pool.max_size() as usize
    }

    pub(crate) fn idle(&self) -> usize {
        self.pool.state().idle_connections as usize
    }
}

/// Exclusive lease on one pooled connection.
pub struct PooledConnection {
    conn: r2d2::PooledConnection<SqliteConnectionManager>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }
        warn!("event=pool_return module=db status=reset reason=open_transaction");
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!("event=pool_return module=db status=error error={err}");
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}
