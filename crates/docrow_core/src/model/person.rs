//! Person record.

use crate::model::record::{require_name, Record, RecordHeader, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub street1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Person {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub nicknames: Vec<String>,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: RecordHeader::named(name),
            ..Self::default()
        }
    }

    pub fn sample(n: usize) -> Self {
        Self {
            header: RecordHeader::named(format!("Person {n}")),
            email: format!("person{n}@example.org"),
            age: Some(18 + (n as u32 % 60)),
            address: Address {
                street1: format!("{} Main Street", n + 1),
                city: ["Bergen", "Turku", "Cork"][n % 3].to_string(),
                zip: format!("{:05}", 10_000 + n),
            },
            nicknames: Vec::new(),
        }
    }
}

impl Record for Person {
    const KIND: &'static str = "person";
    const TABLE: &'static str = "person";

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_name::<Self>(self.name())?;
        if !self.email.is_empty() && !EMAIL_RE.is_match(&self.email) {
            return Err(ValidationError::InvalidField {
                kind: Self::KIND,
                field: "email",
                reason: format!("`{}` is not an email address", self.email),
            });
        }
        Ok(())
    }
}
