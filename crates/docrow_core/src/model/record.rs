//! Record-type descriptor shared by every persisted entity.
//!
//! # Responsibility
//! - Define the header fields every record carries (`id`, `name`,
//!   `created`, `modified`).
//! - Describe a record type to the generic store: kind, table, codec and
//!   validation rules.
//!
//! # Invariants
//! - `id` is server-assigned on create and never changes afterwards.
//! - `created` is set once; `modified` moves forward on every write.
//! - Timestamps are kept at microsecond precision so that column and
//!   payload copies compare equal after a round trip.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable record identifier (UUID text, assigned by the store).
pub type RecordId = String;

/// Header fields duplicated into the indexed scalar columns of every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecordHeader {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub modified: DateTime<Utc>,
}

impl RecordHeader {
    /// Header for a record that has not been stored yet.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Input validation failures. These never reach storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing id")]
    EmptyId,
    #[error("missing \"name\" field for {kind}")]
    EmptyName { kind: &'static str },
    #[error("invalid {kind}.{field}: {reason}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// Record-type descriptor consumed by the generic store and service.
///
/// The serde implementation is the codec: it maps a record to the JSON
/// payload column and to the flat key/value form used for patching.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Human readable type name used in errors and logs.
    const KIND: &'static str;
    /// Storage table. Must be a plain SQL identifier.
    const TABLE: &'static str;

    fn header(&self) -> &RecordHeader;

    fn header_mut(&mut self) -> &mut RecordHeader;

    fn id(&self) -> &str {
        &self.header().id
    }

    fn name(&self) -> &str {
        &self.header().name
    }

    /// Checks required fields before any write.
    ///
    /// The default only requires a non-blank `name`; record types extend it
    /// with their own field rules.
    fn validate(&self) -> Result<(), ValidationError> {
        require_name::<Self>(self.name())
    }
}

/// Shared `name` rule, usable from overridden `validate` implementations.
pub fn require_name<R: Record>(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName { kind: R::KIND });
    }
    Ok(())
}

/// Rejects blank ids before any lookup is attempted.
pub fn require_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    Ok(())
}

/// Current wall-clock time truncated to microseconds.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `modified` value for a record last written at `previous`.
///
/// Always strictly later than `previous`, even when the clock has not
/// advanced past it (coarse clocks, back-to-back writes).
pub fn next_modified(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_micros();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}
