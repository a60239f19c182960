//! Persistence layer: generic record store, filters and patch merging.
//!
//! # Responsibility
//! - Map typed records to rows (`id, name, created, modified, payload`) and
//!   back.
//! - Isolate SQL details from the service orchestration layer.
//!
//! # Invariants
//! - Writes call `Record::validate()` before any SQL mutation.
//! - "Not found" is `Ok(None)` on reads and `StoreError::NotFound` on
//!   update preconditions.

pub mod entity_store;
pub mod filter;
pub mod patch;
