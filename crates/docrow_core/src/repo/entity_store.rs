//! Generic record store over one SQLite table per record type.
//!
//! # Responsibility
//! - Create/read/update/delete/list any `Record` type.
//! - Keep the indexed scalar columns and the JSON payload consistent.
//! - Translate query-by-example filters into `json_contains` predicates.
//!
//! # Invariants
//! - Validation failures return before any SQL is issued.
//! - A missing row on `get_by_id`/`delete_by_id` is a normal outcome,
//!   not an error.
//! - On read the scalar columns are authoritative over payload copies.
//! - `update` writes one `modified` value to both the column and the
//!   payload, strictly later than the stored one.
//!
//! The store runs on whatever connection it is given; transaction
//! boundaries belong to the caller (see `crate::tx`).

use crate::model::record::{next_modified, now_micros, require_id, Record, ValidationError};
use crate::repo::filter::{Filter, CONTAINS_FN};
use crate::repo::patch::{merge_patch, MergeError, Patch};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, Row};
use std::marker::PhantomData;
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{op} {kind} `{key}`: {source}")]
    Storage {
        op: &'static str,
        kind: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{op} {kind} `{key}`: payload codec: {source}")]
    Codec {
        op: &'static str,
        kind: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Store bound to one connection (normally the active transaction's).
pub struct EntityStore<'conn, R> {
    conn: &'conn Connection,
    _record: PhantomData<fn() -> R>,
}

impl<'conn, R: Record> EntityStore<'conn, R> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            _record: PhantomData,
        }
    }

    /// Validates, assigns `id`/`created`/`modified`, and inserts `record`.
    ///
    /// Any caller-supplied `id` is discarded.
    pub fn create(&self, mut record: R) -> StoreResult<R> {
        record.validate()?;

        let now = now_micros();
        {
            let header = record.header_mut();
            header.id = Uuid::new_v4().to_string();
            header.created = now;
            header.modified = now;
        }
        let id = record.id().to_string();
        let payload = encode(&record, "create", &id)?;

        let header = record.header();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (id, name, created, modified, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    R::TABLE
                ),
                params![header.id, header.name, header.created, header.modified, payload],
            )
            .map_err(|source| storage_error::<R>("insert", &id, source))?;

        debug!(
            "event=store_write module=repo status=ok op=create kind={} id={}",
            R::KIND,
            id
        );
        Ok(record)
    }

    /// Returns the record with `id`, or `None` when no row exists.
    pub fn get_by_id(&self, id: &str) -> StoreResult<Option<R>> {
        require_id(id)?;

        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT id, name, created, modified, payload FROM \"{}\" WHERE id = ?1;",
                R::TABLE
            ))
            .map_err(|source| storage_error::<R>("select", id, source))?;
        let mut rows = stmt
            .query([id])
            .map_err(|source| storage_error::<R>("select", id, source))?;

        match rows
            .next()
            .map_err(|source| storage_error::<R>("select", id, source))?
        {
            Some(row) => Ok(Some(decode_row(row, "select")?)),
            None => Ok(None),
        }
    }

    /// Returns every record whose payload contains `filter`, in storage
    /// order. `None` or an empty filter selects all rows.
    pub fn list(&self, filter: Option<&Filter>) -> StoreResult<Vec<R>> {
        let clause = FilterClause::build::<R>(filter, "list")?;
        let sql = format!(
            "SELECT id, name, created, modified, payload FROM \"{}\"{} ORDER BY rowid;",
            R::TABLE,
            clause.predicate
        );
        let fail = |source: rusqlite::Error| storage_error::<R>("list", clause.key(), source);

        let mut stmt = self.conn.prepare(&sql).map_err(fail)?;
        let mut rows = match &clause.param {
            Some(json) => stmt.query([json]),
            None => stmt.query([]),
        }
        .map_err(fail)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(fail)? {
            records.push(decode_row(row, "list")?);
        }
        Ok(records)
    }

    /// Counts the rows `list(filter)` would return.
    pub fn count(&self, filter: Option<&Filter>) -> StoreResult<u64> {
        let clause = FilterClause::build::<R>(filter, "count")?;
        let sql = format!("SELECT COUNT(*) FROM \"{}\"{};", R::TABLE, clause.predicate);
        let count: i64 = match &clause.param {
            Some(json) => self.conn.query_row(&sql, [json], |row| row.get(0)),
            None => self.conn.query_row(&sql, [], |row| row.get(0)),
        }
        .map_err(|source| storage_error::<R>("count", clause.key(), source))?;
        Ok(count.max(0) as u64)
    }

    /// Replaces the stored record with `record` and returns the row as
    /// persisted.
    ///
    /// `created` keeps its stored value. `modified` is server-assigned.
    /// The existence check and the write are not atomic on their own; run
    /// this inside an immediate transaction to exclude concurrent writers.
    pub fn update(&self, record: R) -> StoreResult<R> {
        require_id(record.id())?;
        record.validate()?;

        let id = record.id().to_string();
        let saved = self.get_by_id(&id)?.ok_or_else(|| StoreError::NotFound {
            kind: R::KIND,
            id: id.clone(),
        })?;

        let mut record = record;
        {
            let header = record.header_mut();
            header.created = saved.header().created;
            header.modified = next_modified(saved.header().modified);
        }
        let payload = encode(&record, "update", &id)?;

        let header = record.header();
        self.conn
            .execute(
                &format!(
                    "UPDATE \"{}\" SET name = ?2, created = ?3, modified = ?4, payload = ?5
                     WHERE id = ?1;",
                    R::TABLE
                ),
                params![header.id, header.name, header.created, header.modified, payload],
            )
            .map_err(|source| storage_error::<R>("update", &id, source))?;

        debug!(
            "event=store_write module=repo status=ok op=update kind={} id={}",
            R::KIND,
            id
        );
        self.get_by_id(&id)?
            .ok_or(StoreError::NotFound { kind: R::KIND, id })
    }

    /// Applies `patch` to the stored record and writes it via `update`.
    pub fn partial_update(&self, id: &str, patch: &Patch) -> StoreResult<R> {
        require_id(id)?;
        let base = self.get_by_id(id)?.ok_or_else(|| StoreError::NotFound {
            kind: R::KIND,
            id: id.to_string(),
        })?;
        let merged = merge_patch(&base, patch)?;
        self.update(merged)
    }

    /// Deletes the row for `record.id`. Returns whether a row was removed.
    pub fn delete(&self, record: &R) -> StoreResult<bool> {
        self.delete_by_id(record.id())
    }

    /// Deletes the row for `id`. Deleting an absent id succeeds with `false`.
    pub fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        require_id(id)?;
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?1;", R::TABLE),
                [id],
            )
            .map_err(|source| storage_error::<R>("delete", id, source))?;

        debug!(
            "event=store_write module=repo status=ok op=delete kind={} id={} removed={}",
            R::KIND,
            id,
            changed > 0
        );
        Ok(changed > 0)
    }
}

/// WHERE clause and bound filter text for `list`/`count`.
struct FilterClause {
    predicate: String,
    param: Option<String>,
}

impl FilterClause {
    fn build<R: Record>(filter: Option<&Filter>, op: &'static str) -> StoreResult<Self> {
        let Some(filter) = filter.filter(|filter| !filter.is_empty()) else {
            return Ok(Self {
                predicate: String::new(),
                param: None,
            });
        };
        let json = serde_json::to_string(filter).map_err(|source| StoreError::Codec {
            op,
            kind: R::KIND,
            key: "filter".to_string(),
            source,
        })?;
        Ok(Self {
            predicate: format!(" WHERE {CONTAINS_FN}(payload, ?1)"),
            param: Some(json),
        })
    }

    fn key(&self) -> &str {
        self.param.as_deref().unwrap_or("*")
    }
}

fn encode<R: Record>(record: &R, op: &'static str, id: &str) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|source| StoreError::Codec {
        op,
        kind: R::KIND,
        key: id.to_string(),
        source,
    })
}

fn decode_row<R: Record>(row: &Row<'_>, op: &'static str) -> StoreResult<R> {
    let id: String = row
        .get(0)
        .map_err(|source| storage_error::<R>(op, "?", source))?;
    let read = |source: rusqlite::Error| storage_error::<R>(op, &id, source);
    let name: String = row.get(1).map_err(read)?;
    let created: DateTime<Utc> = row.get(2).map_err(read)?;
    let modified: DateTime<Utc> = row.get(3).map_err(read)?;
    let payload: String = row.get(4).map_err(read)?;

    let mut record: R = serde_json::from_str(&payload).map_err(|source| StoreError::Codec {
        op,
        kind: R::KIND,
        key: id.clone(),
        source,
    })?;
    let header = record.header_mut();
    header.id = id;
    header.name = name;
    header.created = created;
    header.modified = modified;
    Ok(record)
}

fn storage_error<R: Record>(op: &'static str, key: &str, source: rusqlite::Error) -> StoreError {
    StoreError::Storage {
        op,
        kind: R::KIND,
        key: key.to_string(),
        source,
    }
}
