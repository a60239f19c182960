//! Service orchestration over the generic entity store.
//!
//! # Responsibility
//! - Wrap every store operation in a transaction scope.
//! - Run the record type's hook before touching the store.
//! - Commit on success; roll back on failure and report both errors when the
//!   rollback itself fails.
//!
//! # See also
//! - `crate::tx` for ownership rules of joined transactions.

mod entity_service;
pub mod hooks;

pub use entity_service::{
    in_transaction, EntityService, ErrorKind, Operation, ServiceError, ServiceResult,
};
pub use hooks::{HookRejection, HookResult, Hooks, NoopHooks};
