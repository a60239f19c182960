//! Core of docrow: a generic, transactional document-row store.
//!
//! Each record type lives in its own SQLite table as indexed scalar columns
//! plus a JSON payload. Services wrap every store call in an explicit,
//! request-scoped transaction and run per-type hooks before touching rows.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tx;

pub use config::{AppConfig, ConfigError, DatabaseConfig, LogConfig};
pub use db::{
    open_database, open_from_config, open_in_memory, open_in_memory_with, Database, DbError,
    DbResult,
};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LoggingError,
};
pub use model::book::{Book, Publisher};
pub use model::person::{Address, Person};
pub use model::record::{Record, RecordHeader, RecordId, ValidationError};
pub use repo::entity_store::{EntityStore, StoreError, StoreResult};
pub use repo::filter::{json_contains, Filter};
pub use repo::patch::{merge_patch, MergeError, Patch};
pub use service::{
    in_transaction, EntityService, ErrorKind, HookRejection, HookResult, Hooks, NoopHooks,
    Operation, ServiceError, ServiceResult,
};
pub use tx::{TxContext, TxError, TxMode, TxResult, TxStateError, TxToken};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
