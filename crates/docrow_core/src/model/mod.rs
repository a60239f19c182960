//! Domain records persisted by the generic entity store.
//!
//! # Responsibility
//! - Define the record-type descriptor (`Record`) and shared header fields.
//! - Ship the concrete record types served by this workspace.
//!
//! # Invariants
//! - Every record is identified by a server-assigned, never reused `id`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod book;
pub mod person;
pub mod record;
