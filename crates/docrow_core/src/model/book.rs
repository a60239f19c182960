//! Book record.
//!
//! # Invariants
//! - `isbn`, when set, is a 10 or 13 character ISBN (hyphens ignored).
//! - `publisher` is always present so nested filters have a stable shape.

use crate::model::record::{require_name, Record, RecordHeader, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid isbn regex"));

/// Publishing house, stored as a nested object in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Publisher {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Book {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub pages: u32,
    /// Publication year. Serialized as `null` when unknown so it stays patchable.
    #[serde(default)]
    pub published: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub publisher: Publisher,
}

impl Book {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: RecordHeader::named(name),
            ..Self::default()
        }
    }

    /// Deterministic development record, `n` distinguishes instances.
    pub fn sample(n: usize) -> Self {
        Self {
            header: RecordHeader::named(format!("Book {n}")),
            author: format!("Author {}", n % 7),
            isbn: format!("{:013}", 9_780_000_000_000_u64 + n as u64),
            pages: 100 + (n as u32 % 400),
            published: Some(1950 + (n as i32 % 70)),
            tags: vec![format!("shelf-{}", n % 3)],
            publisher: Publisher {
                name: format!("House {}", n % 4),
                city: ["Oslo", "Lyon", "Porto", "Graz"][n % 4].to_string(),
            },
        }
    }
}

impl Record for Book {
    const KIND: &'static str = "book";
    const TABLE: &'static str = "book";

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_name::<Self>(self.name())?;
        if !self.isbn.is_empty() {
            let compact = self.isbn.replace('-', "");
            if !ISBN_RE.is_match(&compact) {
                return Err(ValidationError::InvalidField {
                    kind: Self::KIND,
                    field: "isbn",
                    reason: format!("`{}` is not an ISBN-10 or ISBN-13", self.isbn),
                });
            }
        }
        Ok(())
    }
}
