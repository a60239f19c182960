//! Generic use-case service for any `Record` type.
//!
//! # Responsibility
//! - Run each store operation as `begin -> hook -> store -> commit/rollback`.
//! - Map every failure to one `ServiceError` with a stable `ErrorKind`.
//!
//! # Invariants
//! - Validation failures return before a transaction is opened.
//! - A hook rejection aborts before any store call.
//! - No operation leaves a transaction it opened still open on return.

use crate::db::Database;
use crate::model::record::{require_id, Record, ValidationError};
use crate::repo::entity_store::{EntityStore, StoreError};
use crate::repo::filter::Filter;
use crate::repo::patch::Patch;
use crate::service::hooks::{HookRejection, HookResult, Hooks, NoopHooks};
use crate::tx::{TxContext, TxError, TxMode, TxStateError};
use log::{debug, warn};
use std::marker::PhantomData;
use std::time::Instant;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Operation kinds routed through the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    PartialUpdate,
    Delete,
    DeleteById,
    GetById,
    List,
    Count,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::PartialUpdate => "partial_update",
            Self::Delete => "delete",
            Self::DeleteById => "delete_by_id",
            Self::GetById => "get_by_id",
            Self::List => "list",
            Self::Count => "count",
        }
    }

    /// Reads open deferred transactions; anything that writes takes the
    /// write lock at begin.
    pub fn tx_mode(self) -> TxMode {
        match self {
            Self::GetById | Self::List | Self::Count => TxMode::Deferred,
            _ => TxMode::Immediate,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Storage,
    State,
    Resource,
    Merge,
    HookRejection,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{operation} {kind} rejected by hook: {rejection}")]
    Hook {
        operation: Operation,
        kind: &'static str,
        #[source]
        rejection: HookRejection,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tx(#[from] TxError),
    /// The operation failed and the rollback that followed failed too.
    #[error("{cause}; rollback also failed: {rollback}")]
    RollbackFailed {
        cause: Box<ServiceError>,
        #[source]
        rollback: TxError,
    },
}

impl ServiceError {
    /// Failure category. For `RollbackFailed` this is the kind of the
    /// operation error, not of the rollback error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Hook { .. } => ErrorKind::HookRejection,
            Self::Store(err) => match err {
                StoreError::Validation(_) => ErrorKind::Validation,
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::Storage { .. } | StoreError::Codec { .. } => ErrorKind::Storage,
                StoreError::Merge(_) => ErrorKind::Merge,
            },
            Self::Tx(TxError::State(_)) => ErrorKind::State,
            Self::Tx(TxError::Resource(_)) => ErrorKind::Resource,
            Self::RollbackFailed { cause, .. } => cause.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<TxStateError> for ServiceError {
    fn from(value: TxStateError) -> Self {
        Self::Tx(value.into())
    }
}

/// Runs `f` inside the transaction carried by `ctx`, opening one when none
/// is active.
///
/// The caller that opened the transaction commits on `Ok` and rolls back on
/// `Err`. A nested call joins instead; its `Err` marks the transaction
/// rollback-only so the outer commit cannot persist the failed step.
pub fn in_transaction<T, F>(
    db: &Database,
    ctx: &mut TxContext,
    mode: TxMode,
    f: F,
) -> ServiceResult<T>
where
    F: FnOnce(&mut TxContext) -> ServiceResult<T>,
{
    let token = db.begin_tx(ctx, mode)?;
    match f(ctx) {
        Ok(value) => {
            ctx.commit_tx(token)?;
            Ok(value)
        }
        Err(cause) => match ctx.rollback_tx(token) {
            Ok(()) => Err(cause),
            Err(rollback) => {
                warn!(
                    "event=tx_rollback module=service status=error cause_kind={:?}",
                    cause.kind()
                );
                Err(ServiceError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                })
            }
        },
    }
}

/// CRUD entry points for record type `R`, with `H` as its hook set.
pub struct EntityService<R, H = NoopHooks> {
    db: Database,
    hooks: H,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> EntityService<R, NoopHooks> {
    pub fn new(db: Database) -> Self {
        Self::with_hooks(db, NoopHooks)
    }
}

impl<R: Record, H: Hooks<R>> EntityService<R, H> {
    pub fn with_hooks(db: Database, hooks: H) -> Self {
        Self {
            db,
            hooks,
            _record: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Validates and stores a new record; returns it with server-assigned
    /// `id`, `created` and `modified`.
    pub fn create(&self, ctx: &mut TxContext, record: R) -> ServiceResult<R> {
        record.validate()?;
        self.run(ctx, Operation::Create, |store, hooks| {
            check::<R>(Operation::Create, hooks.before_create(store, &record))?;
            Ok(store.create(record)?)
        })
    }

    /// Replaces an existing record. Absent ids fail with `NotFound`.
    pub fn update(&self, ctx: &mut TxContext, record: R) -> ServiceResult<R> {
        require_id(record.id())?;
        record.validate()?;
        self.run(ctx, Operation::Update, |store, hooks| {
            check::<R>(Operation::Update, hooks.before_update(store, &record))?;
            Ok(store.update(record)?)
        })
    }

    /// Overwrites the fields of `id` named in `patch`.
    pub fn partial_update(
        &self,
        ctx: &mut TxContext,
        id: &str,
        patch: &Patch,
    ) -> ServiceResult<R> {
        require_id(id)?;
        self.run(ctx, Operation::PartialUpdate, |store, hooks| {
            check::<R>(
                Operation::PartialUpdate,
                hooks.before_partial_update(store, id, patch),
            )?;
            Ok(store.partial_update(id, patch)?)
        })
    }

    /// Deletes `record`; returns whether a row was removed.
    pub fn delete(&self, ctx: &mut TxContext, record: &R) -> ServiceResult<bool> {
        require_id(record.id())?;
        self.run(ctx, Operation::Delete, |store, hooks| {
            check::<R>(Operation::Delete, hooks.before_delete(store, record))?;
            Ok(store.delete(record)?)
        })
    }

    /// Deletes the row for `id`. An absent id commits cleanly with `false`.
    pub fn delete_by_id(&self, ctx: &mut TxContext, id: &str) -> ServiceResult<bool> {
        require_id(id)?;
        self.run(ctx, Operation::DeleteById, |store, hooks| {
            check::<R>(Operation::DeleteById, hooks.before_delete_by_id(store, id))?;
            if store.get_by_id(id)?.is_none() {
                return Ok(false);
            }
            Ok(store.delete_by_id(id)?)
        })
    }

    /// Returns the record for `id`, `None` when absent.
    pub fn get_by_id(&self, ctx: &mut TxContext, id: &str) -> ServiceResult<Option<R>> {
        require_id(id)?;
        self.run(ctx, Operation::GetById, |store, hooks| {
            check::<R>(Operation::GetById, hooks.before_get_by_id(store, id))?;
            Ok(store.get_by_id(id)?)
        })
    }

    /// Returns the records containing `filter` (all records for `None`).
    pub fn list(&self, ctx: &mut TxContext, filter: Option<&Filter>) -> ServiceResult<Vec<R>> {
        self.run(ctx, Operation::List, |store, hooks| {
            check::<R>(Operation::List, hooks.before_list(store, filter))?;
            Ok(store.list(filter)?)
        })
    }

    /// Number of records containing `filter`, counted without decoding rows.
    pub fn count(&self, ctx: &mut TxContext, filter: Option<&Filter>) -> ServiceResult<u64> {
        self.run(ctx, Operation::Count, |store, hooks| {
            check::<R>(Operation::Count, hooks.before_count(store, filter))?;
            Ok(store.count(filter)?)
        })
    }

    /// Creates every record in one transaction. Hooks run per record; the
    /// first failure discards the whole batch.
    pub fn seed(
        &self,
        ctx: &mut TxContext,
        records: impl IntoIterator<Item = R>,
    ) -> ServiceResult<Vec<R>> {
        let started = Instant::now();
        let created = in_transaction(&self.db, ctx, TxMode::Immediate, |ctx| {
            records
                .into_iter()
                .map(|record| self.create(ctx, record))
                .collect::<ServiceResult<Vec<R>>>()
        })?;
        debug!(
            "event=service_seed module=service status=ok kind={} count={} duration_ms={}",
            R::KIND,
            created.len(),
            started.elapsed().as_millis()
        );
        Ok(created)
    }

    fn run<T>(
        &self,
        ctx: &mut TxContext,
        operation: Operation,
        f: impl FnOnce(&EntityStore<'_, R>, &H) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let started = Instant::now();
        let result = in_transaction(&self.db, ctx, operation.tx_mode(), |ctx| {
            let store = EntityStore::<R>::new(ctx.connection()?);
            f(&store, &self.hooks)
        });

        match &result {
            Ok(_) => debug!(
                "event=service_op module=service status=ok op={} kind={} duration_ms={}",
                operation,
                R::KIND,
                started.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=service_op module=service status=error op={} kind={} error_kind={:?} duration_ms={}",
                operation,
                R::KIND,
                err.kind(),
                started.elapsed().as_millis()
            ),
        }
        result
    }
}

impl<R, H: std::fmt::Debug> std::fmt::Debug for EntityService<R, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityService")
            .field("kind", &std::any::type_name::<R>())
            .field("hooks", &self.hooks)
            .finish()
    }
}

fn check<R: Record>(operation: Operation, verdict: HookResult) -> ServiceResult<()> {
    verdict.map_err(|rejection| ServiceError::Hook {
        operation,
        kind: R::KIND,
        rejection,
    })
}
