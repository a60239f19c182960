//! Field-level partial update of a typed record.
//!
//! # Invariants
//! - Only top-level keys already present on the base record are replaced;
//!   unknown keys are dropped, never appended.
//! - Server-managed header keys (`id`, `created`, `modified`) are ignored.
//! - The merged map must deserialize back into the record type.

use crate::model::record::Record;
use serde_json::{Map, Value};
use thiserror::Error;

/// Partial key/value update applied by `merge_patch`.
pub type Patch = Map<String, Value>;

/// Keys a patch may never change.
pub const SERVER_MANAGED_KEYS: [&str; 3] = ["id", "created", "modified"];

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("encode {kind} as field map: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} does not encode as a JSON object")]
    NotAnObject { kind: &'static str },
    #[error("patched {kind} does not match the record shape: {source}")]
    Retype {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Returns a copy of `base` with every applicable `patch` key applied.
pub fn merge_patch<R: Record>(base: &R, patch: &Patch) -> Result<R, MergeError> {
    let encoded = serde_json::to_value(base).map_err(|source| MergeError::Encode {
        kind: R::KIND,
        source,
    })?;
    let Value::Object(mut fields) = encoded else {
        return Err(MergeError::NotAnObject { kind: R::KIND });
    };

    for (key, value) in patch {
        if SERVER_MANAGED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(slot) = fields.get_mut(key) {
            *slot = value.clone();
        }
    }

    serde_json::from_value(Value::Object(fields)).map_err(|source| MergeError::Retype {
        kind: R::KIND,
        source,
    })
}
