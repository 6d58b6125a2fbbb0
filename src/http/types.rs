use axum::http::StatusCode;
use axum::response::Response;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Mutex;

use super::error::fail;

/// Shared service state. The store connection behind the mutex is the only
/// serialization point; handlers hold the lock across their whole
/// check-then-mutate sequence.
pub struct AppState {
    pub db: Mutex<Connection>,
}

/// Query parameters shared by every resource endpoint. Each handler reads
/// the subset it understands and ignores the rest.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    pub resource: Option<String>,
    pub id: Option<String>,
    pub action: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub student_id: Option<String>,
    pub assignment_id: Option<String>,
    pub topic_id: Option<String>,
    pub reply_id: Option<String>,
    pub week_id: Option<String>,
}

/// Parses a POST/PUT body into a JSON object. An empty body acts like `{}`
/// so required-field validation gets to report the specific field; anything
/// that is not a JSON object is a 400.
pub fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>, Response> {
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) | Err(_) => Err(fail(StatusCode::BAD_REQUEST, "Invalid JSON body")),
    }
}

/// Reads a string field from a request body, trimmed. `None` when the field
/// is absent, not a string, or blank.
pub fn body_str<'a>(body: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
