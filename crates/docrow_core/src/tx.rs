//! Transaction context manager.
//!
//! # Responsibility
//! - Bind one logical transaction to a chain of calls through an explicit,
//!   request-scoped `TxContext` passed by `&mut`.
//! - Reuse an active transaction instead of nesting (`begin_tx` joins).
//!   An `Immediate` request never joins a `Deferred` transaction: it would
//!   write without holding the write lock.
//!
//! # Invariants
//! - A context holds at most one transaction, on one pooled connection.
//! - Only the caller that opened a transaction (`TxToken::Owner`) commits or
//!   rolls it back. A joined caller's rollback marks the transaction
//!   rollback-only; the owner's commit then fails instead of persisting.
//! - Dropping a context with an open transaction rolls it back and returns
//!   the connection to the pool.
//! - A context is never shared: it is `Send` but every operation needs
//!   `&mut`, so concurrent operations each own their own context.

use crate::db::{Database, DbError, PooledConnection};
use log::{debug, warn};
use rusqlite::Connection;
use std::time::Instant;
use thiserror::Error;

pub type TxResult<T> = Result<T, TxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxStateError {
    #[error("no active transaction in context")]
    NoTransaction,
    #[error("transaction was marked rollback-only by a joined caller")]
    RollbackOnly,
    #[error("cannot join a {active:?} transaction with a {requested:?} request")]
    ModeMismatch { active: TxMode, requested: TxMode },
}

#[derive(Debug, Error)]
pub enum TxError {
    #[error("transaction state: {0}")]
    State(#[from] TxStateError),
    #[error("transaction resource: {0}")]
    Resource(#[source] DbError),
}

impl From<rusqlite::Error> for TxError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Resource(DbError::Sqlite(value))
    }
}

/// Locking mode used when a transaction is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// `BEGIN DEFERRED`: takes locks lazily. Used for reads.
    Deferred,
    /// `BEGIN IMMEDIATE`: takes the write lock up front, so a
    /// fetch-then-write sequence cannot interleave with another writer.
    Immediate,
}

impl TxMode {
    fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
        }
    }
}

/// Proof of how `begin_tx` attached the caller to the context's
/// transaction. Consumed by `commit_tx`/`rollback_tx`.
#[must_use = "pass the token to commit_tx or rollback_tx"]
#[derive(Debug, PartialEq, Eq)]
pub enum TxToken {
    /// This caller opened the transaction and finishes it.
    Owner,
    /// The transaction belonged to an outer caller and was reused.
    Joined,
}

impl TxToken {
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

struct ActiveTx {
    conn: PooledConnection,
    mode: TxMode,
    rollback_only: bool,
    opened_at: Instant,
}

impl ActiveTx {
    fn rollback(self) -> TxResult<()> {
        let result = self.conn.execute_batch("ROLLBACK;");
        debug!(
            "event=tx_rollback module=tx status={} duration_ms={}",
            if result.is_ok() { "ok" } else { "error" },
            self.opened_at.elapsed().as_millis()
        );
        result.map_err(TxError::from)
    }
}

/// Request-scoped carrier of at most one open transaction.
#[derive(Default)]
pub struct TxContext {
    active: Option<ActiveTx>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.rollback_only)
    }

    /// Mode the active transaction was opened with.
    pub fn mode(&self) -> Option<TxMode> {
        self.active.as_ref().map(|active| active.mode)
    }

    /// Connection of the active transaction.
    pub fn connection(&self) -> TxResult<&Connection> {
        self.active
            .as_ref()
            .map(|active| &*active.conn)
            .ok_or(TxError::State(TxStateError::NoTransaction))
    }

    /// Finishes the caller's part of the transaction.
    ///
    /// - `Owner`: commits, or rolls back and reports `RollbackOnly` when a
    ///   joined caller failed. A failed COMMIT is rolled back and reported as
    ///   a resource error.
    /// - `Joined`: no-op; the owner commits.
    pub fn commit_tx(&mut self, token: TxToken) -> TxResult<()> {
        match token {
            TxToken::Joined => self.connection().map(|_| ()),
            TxToken::Owner => {
                let active = self
                    .active
                    .take()
                    .ok_or(TxError::State(TxStateError::NoTransaction))?;
                if active.rollback_only {
                    active.rollback()?;
                    return Err(TxStateError::RollbackOnly.into());
                }
                if let Err(err) = active.conn.execute_batch("COMMIT;") {
                    warn!("event=tx_commit module=tx status=error error={err}");
                    if let Err(rollback_err) = active.rollback() {
                        warn!(
                            "event=tx_commit module=tx status=error stage=rollback error={rollback_err}"
                        );
                    }
                    return Err(err.into());
                }
                debug!(
                    "event=tx_commit module=tx status=ok duration_ms={}",
                    active.opened_at.elapsed().as_millis()
                );
                Ok(())
            }
        }
    }

    /// Abandons the caller's part of the transaction.
    ///
    /// - `Owner`: rolls back and releases the connection.
    /// - `Joined`: marks the transaction rollback-only so the owner cannot
    ///   commit work this caller reported as failed.
    pub fn rollback_tx(&mut self, token: TxToken) -> TxResult<()> {
        match token {
            TxToken::Joined => {
                let active = self
                    .active
                    .as_mut()
                    .ok_or(TxError::State(TxStateError::NoTransaction))?;
                active.rollback_only = true;
                debug!("event=tx_rollback module=tx status=deferred reason=joined");
                Ok(())
            }
            TxToken::Owner => self
                .active
                .take()
                .ok_or(TxError::State(TxStateError::NoTransaction))?
                .rollback(),
        }
    }
}

impl Drop for TxContext {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            warn!("event=tx_abandoned module=tx status=rollback");
            if let Err(err) = active.rollback() {
                warn!("event=tx_abandoned module=tx status=error error={err}");
            }
        }
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("active", &self.is_active())
            .field("mode", &self.mode())
            .field("rollback_only", &self.is_rollback_only())
            .finish()
    }
}

impl Database {
    /// Joins the transaction already carried by `ctx`, or opens a new one on
    /// a pooled connection.
    ///
    /// Joining an active `Deferred` transaction with an `Immediate` request
    /// fails with `TxStateError::ModeMismatch` and leaves the active
    /// transaction untouched.
    pub fn begin_tx(&self, ctx: &mut TxContext, mode: TxMode) -> TxResult<TxToken> {
        if let Some(active) = &ctx.active {
            if active.mode == TxMode::Deferred && mode == TxMode::Immediate {
                warn!(
                    "event=tx_begin module=tx status=rejected reason=mode_mismatch active={:?} requested={:?}",
                    active.mode, mode
                );
                return Err(TxStateError::ModeMismatch {
                    active: active.mode,
                    requested: mode,
                }
                .into());
            }
            debug!("event=tx_begin module=tx status=joined mode={:?}", active.mode);
            return Ok(TxToken::Joined);
        }

        let conn = self.acquire().map_err(TxError::Resource)?;
        conn.execute_batch(mode.begin_sql())?;
        ctx.active = Some(ActiveTx {
            conn,
            mode,
            rollback_only: false,
            opened_at: Instant::now(),
        });
        debug!("event=tx_begin module=tx status=ok mode={mode:?}");
        Ok(TxToken::Owner)
    }
}
