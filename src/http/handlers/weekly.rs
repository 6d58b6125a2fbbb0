//! Weekly course breakdown: weeks and their comments, dispatched from
//! `/api/weekly`. A missing `resource` parameter defaults to `weeks`, which
//! the week-list page relies on.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::NOW;
use crate::http::error::{created, fail, ok, ok_message, store_failure};
use crate::http::types::{body_str, parse_body, AppState, ResourceQuery};
use crate::validate::{allowed_value, sanitize, valid_date};

const SORT_COLUMNS: &[&str] = &["title", "start_date", "created_at"];
const DEFAULT_SORT: &str = "start_date";

pub async fn dispatch_get(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
) -> Response {
    info!("GET /api/weekly");
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("weekly: database lock", e),
    };
    match q.resource.as_deref().unwrap_or("weeks") {
        "weeks" => match q.id.as_deref() {
            Some(id) => get_week(&conn, id),
            None => list_weeks(&conn, &q),
        },
        "comments" => match q.week_id.as_deref() {
            Some(week_id) => list_comments(&conn, week_id),
            None => fail(StatusCode::BAD_REQUEST, "week_id is required"),
        },
        _ => fail(
            StatusCode::BAD_REQUEST,
            "Invalid resource. Use 'weeks' or 'comments'",
        ),
    }
}

pub async fn dispatch_post(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("POST /api/weekly");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("weekly: database lock", e),
    };
    match q.resource.as_deref().unwrap_or("weeks") {
        "weeks" => create_week(&conn, &body),
        "comments" => create_comment(&conn, &body),
        _ => fail(
            StatusCode::BAD_REQUEST,
            "Invalid resource. Use 'weeks' or 'comments'",
        ),
    }
}

pub async fn dispatch_put(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("PUT /api/weekly");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("weekly: database lock", e),
    };
    match q.resource.as_deref().unwrap_or("weeks") {
        "weeks" => update_week(&conn, &body),
        "comments" => fail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        _ => fail(
            StatusCode::BAD_REQUEST,
            "Invalid resource. Use 'weeks' or 'comments'",
        ),
    }
}

pub async fn dispatch_delete(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("DELETE /api/weekly");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("weekly: database lock", e),
    };
    let id = q.id.as_deref().or_else(|| body_str(&body, "id"));
    match q.resource.as_deref().unwrap_or("weeks") {
        "weeks" => delete_week(&conn, id),
        "comments" => delete_comment(&conn, id),
        _ => fail(
            StatusCode::BAD_REQUEST,
            "Invalid resource. Use 'weeks' or 'comments'",
        ),
    }
}

fn decode_links(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_array)
        .unwrap_or_else(|| json!([]))
}

fn week_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let start_date: String = row.get(2)?;
    let description: String = row.get(3)?;
    let links: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(json!({
        "id": id,
        "title": title,
        "start_date": start_date,
        "description": description,
        "links": decode_links(&links),
        "created_at": created_at,
    }))
}

fn list_weeks(conn: &Connection, q: &ResourceQuery) -> Response {
    let mut sql = String::from(
        "SELECT id, title, start_date, description, links, created_at FROM weeks",
    );
    let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if search.is_some() {
        sql.push_str(" WHERE title LIKE ?1 OR description LIKE ?1");
    }

    let sort = q
        .sort
        .as_deref()
        .and_then(|s| allowed_value(s, SORT_COLUMNS))
        .unwrap_or(DEFAULT_SORT);
    let order = q
        .order
        .as_deref()
        .map(str::to_ascii_lowercase)
        .and_then(|o| allowed_value(&o, &["asc", "desc"]))
        .unwrap_or("asc");
    sql.push_str(&format!(" ORDER BY {sort} {order}"));

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return store_failure("weeks: prepare list", e),
    };
    let rows = if let Some(term) = search {
        let pattern = format!("%{}%", term);
        stmt.query_map([&pattern], week_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    } else {
        stmt.query_map([], week_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    };
    match rows {
        Ok(weeks) => ok(json!(weeks)),
        Err(e) => store_failure("weeks: list query", e),
    }
}

fn get_week(conn: &Connection, id: &str) -> Response {
    if id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "id is required");
    }
    let found = conn
        .query_row(
            "SELECT id, title, start_date, description, links, created_at FROM weeks WHERE id = ?",
            [id],
            week_row,
        )
        .optional();
    match found {
        Ok(Some(week)) => ok(week),
        Ok(None) => fail(StatusCode::NOT_FOUND, "Week not found"),
        Err(e) => store_failure("weeks: select one", e),
    }
}

fn create_week(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "title").is_none()
        || body_str(body, "start_date").is_none()
        || body_str(body, "description").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "title, start_date and description are required",
        );
    }
    let title = sanitize(body_str(body, "title").unwrap_or_default());
    let start_date = body_str(body, "start_date").unwrap_or_default().to_string();
    let description = sanitize(body_str(body, "description").unwrap_or_default());

    if !valid_date(&start_date) {
        return fail(
            StatusCode::BAD_REQUEST,
            "Invalid date format. Use YYYY-MM-DD",
        );
    }

    let links = match body.get("links") {
        None => json!([]),
        Some(v) => match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => v.clone(),
            _ => return fail(StatusCode::BAD_REQUEST, "links must be an array"),
        },
    };

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO weeks(id, title, start_date, description, links, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, {NOW}, {NOW})"
        ),
        (&id, &title, &start_date, &description, links.to_string()),
    );
    match insert {
        Ok(_) => created(
            "Week created successfully",
            json!({
                "id": id,
                "title": title,
                "start_date": start_date,
                "description": description,
                "links": links,
            }),
        ),
        Err(e) => store_failure("weeks: insert", e),
    }
}

fn update_week(conn: &Connection, body: &Map<String, Value>) -> Response {
    let Some(id) = body_str(body, "id") else {
        return fail(StatusCode::BAD_REQUEST, "id is required");
    };
    let id = id.to_string();

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM weeks WHERE id = ?", [&id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("weeks: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Week not found");
    }

    let mut set_parts: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(v) = body.get("title") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "title must be a string");
        };
        set_parts.push("title = ?");
        values.push(sanitize(s));
    }
    if let Some(v) = body.get("start_date") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "start_date must be a string");
        };
        if !valid_date(s) {
            return fail(
                StatusCode::BAD_REQUEST,
                "Invalid date format. Use YYYY-MM-DD",
            );
        }
        set_parts.push("start_date = ?");
        values.push(s.to_string());
    }
    if let Some(v) = body.get("description") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "description must be a string");
        };
        set_parts.push("description = ?");
        values.push(sanitize(s));
    }
    if let Some(v) = body.get("links") {
        match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {
                set_parts.push("links = ?");
                values.push(v.to_string());
            }
            _ => return fail(StatusCode::BAD_REQUEST, "links must be an array"),
        }
    }

    if set_parts.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "No fields to update");
    }

    values.push(id.clone());
    let sql = format!(
        "UPDATE weeks SET {}, updated_at = {NOW} WHERE id = ?",
        set_parts.join(", ")
    );
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(values.iter())) {
        return store_failure("weeks: update", e);
    }

    // The week editor re-renders from the update response, so echo the
    // record back rather than a bare message.
    get_week(conn, &id)
}

fn delete_week(conn: &Connection, id: Option<&str>) -> Response {
    let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "id is required");
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM weeks WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("weeks: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Week not found");
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return store_failure("weeks: begin delete", e),
    };
    if let Err(e) = tx.execute("DELETE FROM week_comments WHERE week_id = ?", [id]) {
        let _ = tx.rollback();
        return store_failure("weeks: delete comments", e);
    }
    let deleted = match tx.execute("DELETE FROM weeks WHERE id = ?", [id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_failure("weeks: delete", e);
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete week");
    }
    if let Err(e) = tx.commit() {
        return store_failure("weeks: commit delete", e);
    }
    ok_message("Week and its comments deleted")
}

fn list_comments(conn: &Connection, week_id: &str) -> Response {
    if week_id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "week_id is required");
    }
    let mut stmt = match conn.prepare(
        "SELECT id, week_id, author, text, created_at
         FROM week_comments WHERE week_id = ?
         ORDER BY created_at ASC, rowid ASC",
    ) {
        Ok(s) => s,
        Err(e) => return store_failure("week comments: prepare list", e),
    };
    let rows = stmt
        .query_map([week_id], |row| {
            let id: String = row.get(0)?;
            let week_id: String = row.get(1)?;
            let author: String = row.get(2)?;
            let text: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "week_id": week_id,
                "author": author,
                "text": text,
                "created_at": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(comments) => ok(json!(comments)),
        Err(e) => store_failure("week comments: list query", e),
    }
}

fn create_comment(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "week_id").is_none()
        || body_str(body, "author").is_none()
        || body_str(body, "text").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "week_id, author and text are required",
        );
    }
    let week_id = body_str(body, "week_id").unwrap_or_default().to_string();
    let author = sanitize(body_str(body, "author").unwrap_or_default());
    let text = sanitize(body_str(body, "text").unwrap_or_default());

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM weeks WHERE id = ?", [&week_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("week comments: week check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Week not found");
    }

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO week_comments(id, week_id, author, text, created_at)
             VALUES(?, ?, ?, ?, {NOW})"
        ),
        (&id, &week_id, &author, &text),
    );
    match insert {
        Ok(_) => created(
            "Comment created successfully",
            json!({
                "id": id,
                "week_id": week_id,
                "author": author,
                "text": text,
            }),
        ),
        Err(e) => store_failure("week comments: insert", e),
    }
}

fn delete_comment(conn: &Connection, id: Option<&str>) -> Response {
    let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "id is required");
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM week_comments WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("week comments: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Comment not found");
    }

    match conn.execute("DELETE FROM week_comments WHERE id = ?", [id]) {
        Ok(0) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete comment",
        ),
        Ok(_) => ok_message("Comment deleted"),
        Err(e) => store_failure("week comments: delete", e),
    }
}
