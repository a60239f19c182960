//! Record table DDL and verification.
//!
//! Every record type gets the same five-column layout: indexed scalar copies
//! of the header fields plus the full JSON payload.

use super::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid table name regex"));

/// Column order shared by DDL, inserts and selects.
pub const RECORD_COLUMNS: [&str; 5] = ["id", "name", "created", "modified", "payload"];

/// Rejects names that are not plain SQL identifiers.
pub fn validate_table_name(table: &str) -> DbResult<()> {
    if TABLE_NAME_RE.is_match(table) {
        Ok(())
    } else {
        Err(DbError::InvalidTableName(table.to_string()))
    }
}

/// Creates the table for `table` if absent, verifies its columns, then
/// indexes `name`.
pub fn ensure_record_table(conn: &Connection, table: &str) -> DbResult<()> {
    validate_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            created TEXT NOT NULL,
            modified TEXT NOT NULL,
            payload TEXT NOT NULL
        );"
    ))?;
    verify_record_table(conn, table)?;
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS \"{table}_name_idx\" ON \"{table}\" (name);"
    ))?;
    Ok(())
}

/// Checks that `table` exists and carries every record column.
pub fn verify_record_table(conn: &Connection, table: &str) -> DbResult<()> {
    validate_table_name(table)?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(DbError::MissingRequiredTable(table.to_string()));
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    for column in RECORD_COLUMNS {
        if !present.iter().any(|name| name.eq_ignore_ascii_case(column)) {
            return Err(DbError::MissingRequiredColumn {
                table: table.to_string(),
                column,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_table_name;

    #[test]
    fn table_names_must_be_plain_identifiers() {
        assert!(validate_table_name("book").is_ok());
        assert!(validate_table_name("_person_v2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2books").is_err());
        assert!(validate_table_name("book; DROP TABLE person").is_err());
        assert!(validate_table_name("bo\"ok").is_err());
    }
}
