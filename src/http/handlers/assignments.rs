//! Assignments and their discussion comments, dispatched from
//! `/api/assignments` by the `resource` query parameter.

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

const SORT_COLUMNS: &[&str] = &["title", "due_date", "created_at"];
const DEFAULT_SORT: &str = "created_at";

pub async fn dispatch_get(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
) -> Response {
    info!("GET /api/assignments");
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("assignments: database lock", e),
    };
    match q.resource.as_deref() {
        Some("assignments") => match q.id.as_deref() {
            Some(id) => get_assignment(&conn, id),
            None => list_assignments(&conn, &q),
        },
        Some("comments") => match q.assignment_id.as_deref() {
            Some(assignment_id) => list_comments(&conn, assignment_id),
            None => fail(StatusCode::BAD_REQUEST, "assignment_id is required"),
        },
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

pub async fn dispatch_post(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("POST /api/assignments");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("assignments: database lock", e),
    };
    match q.resource.as_deref() {
        Some("assignments") => create_assignment(&conn, &body),
        Some("comments") => create_comment(&conn, &body),
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

pub async fn dispatch_put(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("PUT /api/assignments");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("assignments: database lock", e),
    };
    match q.resource.as_deref() {
        Some("assignments") => update_assignment(&conn, &body),
        Some("comments") => fail(
            StatusCode::METHOD_NOT_ALLOWED,
            "PUT not supported for this resource",
        ),
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

pub async fn dispatch_delete(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("DELETE /api/assignments");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("assignments: database lock", e),
    };
    match q.resource.as_deref() {
        Some("assignments") => {
            let id = q
                .id
                .as_deref()
                .or_else(|| body_str(&body, "id"));
            delete_assignment(&conn, id)
        }
        Some("comments") => match q.id.as_deref() {
            Some(id) => delete_comment(&conn, id),
            None => fail(StatusCode::BAD_REQUEST, "Comment ID is required"),
        },
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

fn decode_string_list(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_array)
        .unwrap_or_else(|| json!([]))
}

fn assignment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let due_date: String = row.get(3)?;
    let files: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(json!({
        "id": id,
        "title": title,
        "description": description,
        "due_date": due_date,
        "files": decode_string_list(&files),
        "created_at": created_at,
        "updated_at": updated_at,
    }))
}

fn list_assignments(conn: &Connection, q: &ResourceQuery) -> Response {
    let mut sql = String::from(
        "SELECT id, title, description, due_date, files, created_at, updated_at FROM assignments",
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
        Err(e) => return store_failure("assignments: prepare list", e),
    };
    let rows = if let Some(term) = search {
        let pattern = format!("%{}%", term);
        stmt.query_map([&pattern], assignment_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    } else {
        stmt.query_map([], assignment_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    };
    match rows {
        Ok(assignments) => ok(json!(assignments)),
        Err(e) => store_failure("assignments: list query", e),
    }
}

fn get_assignment(conn: &Connection, id: &str) -> Response {
    if id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Assignment ID is required");
    }
    let found = conn
        .query_row(
            "SELECT id, title, description, due_date, files, created_at, updated_at
             FROM assignments WHERE id = ?",
            [id],
            assignment_row,
        )
        .optional();
    match found {
        Ok(Some(assignment)) => ok(assignment),
        Ok(None) => fail(StatusCode::NOT_FOUND, "Assignment not found"),
        Err(e) => store_failure("assignments: select one", e),
    }
}

fn create_assignment(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "title").is_none()
        || body_str(body, "description").is_none()
        || body_str(body, "due_date").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "title, description, and due_date are required",
        );
    }
    let title = sanitize(body_str(body, "title").unwrap_or_default());
    let description = sanitize(body_str(body, "description").unwrap_or_default());
    let due_date = sanitize(body_str(body, "due_date").unwrap_or_default());

    if !valid_date(&due_date) {
        return fail(
            StatusCode::BAD_REQUEST,
            "Invalid date format (YYYY-MM-DD expected)",
        );
    }

    let files = match body.get("files") {
        None => json!([]),
        Some(v) => match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => v.clone(),
            _ => return fail(StatusCode::BAD_REQUEST, "files must be an array"),
        },
    };

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO assignments(id, title, description, due_date, files, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, {NOW}, {NOW})"
        ),
        (&id, &title, &description, &due_date, files.to_string()),
    );
    match insert {
        Ok(_) => created(
            "Assignment created successfully",
            json!({
                "id": id,
                "title": title,
                "description": description,
                "due_date": due_date,
                "files": files,
            }),
        ),
        Err(e) => store_failure("assignments: insert", e),
    }
}

fn update_assignment(conn: &Connection, body: &Map<String, Value>) -> Response {
    let Some(id) = body_str(body, "id") else {
        return fail(StatusCode::BAD_REQUEST, "id is required");
    };
    let id = id.to_string();

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM assignments WHERE id = ?", [&id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("assignments: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Assignment not found");
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
    if let Some(v) = body.get("description") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "description must be a string");
        };
        set_parts.push("description = ?");
        values.push(sanitize(s));
    }
    if let Some(v) = body.get("due_date") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "due_date must be a string");
        };
        let due_date = sanitize(s);
        if !valid_date(&due_date) {
            return fail(
                StatusCode::BAD_REQUEST,
                "Invalid date format (YYYY-MM-DD expected)",
            );
        }
        set_parts.push("due_date = ?");
        values.push(due_date);
    }
    if let Some(v) = body.get("files") {
        match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {
                set_parts.push("files = ?");
                values.push(v.to_string());
            }
            _ => return fail(StatusCode::BAD_REQUEST, "files must be an array"),
        }
    }

    if set_parts.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "No fields to update");
    }

    values.push(id);
    let sql = format!(
        "UPDATE assignments SET {}, updated_at = {NOW} WHERE id = ?",
        set_parts.join(", ")
    );
    match conn.execute(&sql, rusqlite::params_from_iter(values.iter())) {
        Ok(0) => ok_message("No changes applied"),
        Ok(_) => ok_message("Assignment updated successfully"),
        Err(e) => store_failure("assignments: update", e),
    }
}

fn delete_assignment(conn: &Connection, id: Option<&str>) -> Response {
    let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Assignment ID is required");
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM assignments WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("assignments: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Assignment not found");
    }

    // Comments go first; the schema does not cascade for us.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return store_failure("assignments: begin delete", e),
    };
    if let Err(e) = tx.execute("DELETE FROM comments WHERE assignment_id = ?", [id]) {
        let _ = tx.rollback();
        return store_failure("assignments: delete comments", e);
    }
    let deleted = match tx.execute("DELETE FROM assignments WHERE id = ?", [id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_failure("assignments: delete", e);
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete assignment",
        );
    }
    if let Err(e) = tx.commit() {
        return store_failure("assignments: commit delete", e);
    }
    ok_message("Assignment deleted successfully")
}

fn list_comments(conn: &Connection, assignment_id: &str) -> Response {
    if assignment_id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "assignment_id is required");
    }
    let mut stmt = match conn.prepare(
        "SELECT id, assignment_id, author, text, created_at
         FROM comments WHERE assignment_id = ?
         ORDER BY created_at ASC, rowid ASC",
    ) {
        Ok(s) => s,
        Err(e) => return store_failure("comments: prepare list", e),
    };
    let rows = stmt
        .query_map([assignment_id], |row| {
            let id: String = row.get(0)?;
            let assignment_id: String = row.get(1)?;
            let author: String = row.get(2)?;
            let text: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "assignment_id": assignment_id,
                "author": author,
                "text": text,
                "created_at": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(comments) => ok(json!(comments)),
        Err(e) => store_failure("comments: list query", e),
    }
}

fn create_comment(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "assignment_id").is_none()
        || body_str(body, "author").is_none()
        || body_str(body, "text").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "assignment_id, author, and text are required",
        );
    }
    let assignment_id = body_str(body, "assignment_id").unwrap_or_default().to_string();
    let author = sanitize(body_str(body, "author").unwrap_or_default());
    let text = sanitize(body_str(body, "text").unwrap_or_default());

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM assignments WHERE id = ?",
            [&assignment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("comments: assignment check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Assignment not found");
    }

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO comments(id, assignment_id, author, text, created_at)
             VALUES(?, ?, ?, ?, {NOW})"
        ),
        (&id, &assignment_id, &author, &text),
    );
    match insert {
        Ok(_) => created(
            "Comment created successfully",
            json!({
                "id": id,
                "assignment_id": assignment_id,
                "author": author,
                "text": text,
            }),
        ),
        Err(e) => store_failure("comments: insert", e),
    }
}

fn delete_comment(conn: &Connection, id: &str) -> Response {
    if id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Comment ID is required");
    }
    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM comments WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("comments: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Comment not found");
    }
    match conn.execute("DELETE FROM comments WHERE id = ?", [id]) {
        Ok(0) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete comment",
        ),
        Ok(_) => ok_message("Comment deleted successfully"),
        Err(e) => store_failure("comments: delete", e),
    }
}
