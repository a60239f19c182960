//! Pre-operation extension points.
//!
//! Each record type gets one `Hooks` implementation, chosen when its
//! `EntityService` is built. Every method runs inside the operation's
//! transaction, before the store call, and may veto the operation. The
//! defaults accept everything.

use crate::model::record::Record;
use crate::repo::entity_store::EntityStore;
use crate::repo::filter::Filter;
use crate::repo::patch::Patch;
use thiserror::Error;

pub type HookResult = Result<(), HookRejection>;

/// Reason a hook declined an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HookRejection {
    pub reason: String,
}

impl HookRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Business rules invoked before each store operation for record type `R`.
///
/// `store` is bound to the operation's transaction, so lookups made by a
/// hook see the same snapshot the operation will write to.
pub trait Hooks<R: Record>: Send + Sync {
    fn before_create(&self, _store: &EntityStore<'_, R>, _record: &R) -> HookResult {
        Ok(())
    }

    fn before_update(&self, _store: &EntityStore<'_, R>, _record: &R) -> HookResult {
        Ok(())
    }

    fn before_partial_update(
        &self,
        _store: &EntityStore<'_, R>,
        _id: &str,
        _patch: &Patch,
    ) -> HookResult {
        Ok(())
    }

    fn before_delete(&self, _store: &EntityStore<'_, R>, _record: &R) -> HookResult {
        Ok(())
    }

    fn before_delete_by_id(&self, _store: &EntityStore<'_, R>, _id: &str) -> HookResult {
        Ok(())
    }

    fn before_get_by_id(&self, _store: &EntityStore<'_, R>, _id: &str) -> HookResult {
        Ok(())
    }

    fn before_list(&self, _store: &EntityStore<'_, R>, _filter: Option<&Filter>) -> HookResult {
        Ok(())
    }

    fn before_count(&self, _store: &EntityStore<'_, R>, _filter: Option<&Filter>) -> HookResult {
        Ok(())
    }
}

/// Accept-everything hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<R: Record> Hooks<R> for NoopHooks {}
