//! Query-by-example filters and the `json_contains` SQL function.
//!
//! A filter matches a row when the row's JSON payload structurally contains
//! it, with the same rules as PostgreSQL's `jsonb @>`:
//! - objects: every filter key exists in the payload and its value matches
//!   recursively (nested maps match nested sub-objects);
//! - arrays: every filter element is contained in some payload element;
//! - scalars: equal (numbers compare by value, so `1` matches `1.0`).
//!
//! There is no inequality, ordering, wildcard or OR support.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use serde_json::{Map, Value};

/// Nested field-name to expected-value mapping. Empty means "match all".
pub type Filter = Map<String, Value>;

/// Name of the SQL function registered on every pooled connection.
pub const CONTAINS_FN: &str = "json_contains";

/// Returns whether `target` structurally contains `pattern`.
pub fn json_contains(target: &Value, pattern: &Value) -> bool {
    match (target, pattern) {
        (Value::Object(target), Value::Object(pattern)) => pattern.iter().all(|(key, expected)| {
            target
                .get(key)
                .is_some_and(|actual| json_contains(actual, expected))
        }),
        (Value::Array(target), Value::Array(pattern)) => pattern
            .iter()
            .all(|expected| target.iter().any(|actual| json_contains(actual, expected))),
        (Value::Number(actual), Value::Number(expected)) => numbers_equal(actual, expected),
        (actual, expected) => actual == expected,
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Registers `json_contains(payload TEXT, filter TEXT) -> INTEGER`.
pub(crate) fn register_sql_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        CONTAINS_FN,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let payload: String = ctx.get(0)?;
            let filter: String = ctx.get(1)?;
            let payload: Value = serde_json::from_str(&payload)
                .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
            let filter: Value = serde_json::from_str(&filter)
                .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
            Ok(json_contains(&payload, &filter))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::{json_contains, register_sql_functions};
    use rusqlite::Connection;
    use serde_json::json;

    #[test]
    fn object_subset_matches() {
        let row = json!({"name": "alpha", "pages": 120, "publisher": {"city": "Oslo", "name": "H"}});
        assert!(json_contains(&row, &json!({})));
        assert!(json_contains(&row, &json!({"name": "alpha"})));
        assert!(json_contains(&row, &json!({"publisher": {"city": "Oslo"}})));
        assert!(!json_contains(&row, &json!({"name": "beta"})));
        assert!(!json_contains(&row, &json!({"missing": null})));
        assert!(!json_contains(&row, &json!({"publisher": {"city": "Lyon"}})));
    }

    #[test]
    fn nested_object_does_not_match_flattened_key() {
        let row = json!({"publisher": {"city": "Oslo"}});
        assert!(!json_contains(&row, &json!({"city": "Oslo"})));
    }

    #[test]
    fn arrays_match_by_element_containment() {
        let row = json!({"tags": ["a", "b", {"k": 1}]});
        assert!(json_contains(&row, &json!({"tags": ["b"]})));
        assert!(json_contains(&row, &json!({"tags": ["b", "a"]})));
        assert!(json_contains(&row, &json!({"tags": [{"k": 1}]})));
        assert!(json_contains(&row, &json!({"tags": []})));
        assert!(!json_contains(&row, &json!({"tags": ["c"]})));
        assert!(!json_contains(&row, &json!({"tags": "a"})));
    }

    #[test]
    fn numbers_compare_by_value_and_types_do_not_coerce() {
        assert!(json_contains(&json!({"n": 1}), &json!({"n": 1.0})));
        assert!(!json_contains(&json!({"n": 1}), &json!({"n": "1"})));
        assert!(!json_contains(&json!({"n": null}), &json!({"n": 0})));
        assert!(json_contains(&json!({"n": null}), &json!({"n": null})));
    }

    #[test]
    fn sql_function_is_callable() {
        let conn = Connection::open_in_memory().unwrap();
        register_sql_functions(&conn).unwrap();

        let hit: bool = conn
            .query_row(
                "SELECT json_contains(?1, ?2);",
                [r#"{"name":"alpha","tags":["x"]}"#, r#"{"tags":["x"]}"#],
                |row| row.get(0),
            )
            .unwrap();
        assert!(hit);

        let err = conn.query_row(
            "SELECT json_contains(?1, ?2);",
            ["not json", "{}"],
            |row| row.get::<_, bool>(0),
        );
        assert!(err.is_err());
    }
}
