//! Discussion board: topics and their replies, dispatched from
//! `/api/discussion` by the `resource` query parameter.

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
use crate::validate::{allowed_value, sanitize};

const SORT_COLUMNS: &[&str] = &["subject", "author", "created_at"];
const DEFAULT_SORT: &str = "created_at";

pub async fn dispatch_get(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
) -> Response {
    info!("GET /api/discussion");
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("discussion: database lock", e),
    };
    match q.resource.as_deref() {
        Some("topics") => match q.topic_id.as_deref() {
            Some(topic_id) => get_topic(&conn, topic_id),
            None => list_topics(&conn, &q),
        },
        Some("replies") => match q.topic_id.as_deref() {
            Some(topic_id) => list_replies(&conn, topic_id),
            None => fail(StatusCode::BAD_REQUEST, "Topic ID is required"),
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
    info!("POST /api/discussion");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("discussion: database lock", e),
    };
    match q.resource.as_deref() {
        Some("topics") => create_topic(&conn, &body),
        Some("replies") => create_reply(&conn, &body),
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

pub async fn dispatch_put(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("PUT /api/discussion");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("discussion: database lock", e),
    };
    match q.resource.as_deref() {
        Some("topics") => update_topic(&conn, &body),
        Some("replies") => fail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

pub async fn dispatch_delete(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
) -> Response {
    info!("DELETE /api/discussion");
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("discussion: database lock", e),
    };
    match q.resource.as_deref() {
        Some("topics") => delete_topic(&conn, q.topic_id.as_deref()),
        Some("replies") => delete_reply(&conn, q.reply_id.as_deref()),
        None => fail(StatusCode::BAD_REQUEST, "resource is required"),
        Some(_) => fail(StatusCode::BAD_REQUEST, "Invalid resource"),
    }
}

fn topic_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let topic_id: String = row.get(0)?;
    let subject: String = row.get(1)?;
    let message: String = row.get(2)?;
    let author: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(json!({
        "topic_id": topic_id,
        "subject": subject,
        "message": message,
        "author": author,
        "created_at": created_at,
    }))
}

fn list_topics(conn: &Connection, q: &ResourceQuery) -> Response {
    let mut sql =
        String::from("SELECT topic_id, subject, message, author, created_at FROM topics");
    let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if search.is_some() {
        sql.push_str(" WHERE subject LIKE ?1 OR message LIKE ?1 OR author LIKE ?1");
    }

    let sort = q
        .sort
        .as_deref()
        .and_then(|s| allowed_value(s, SORT_COLUMNS))
        .unwrap_or(DEFAULT_SORT);
    // Newest topics first unless the caller asks otherwise.
    let order = q
        .order
        .as_deref()
        .map(str::to_ascii_lowercase)
        .and_then(|o| allowed_value(&o, &["asc", "desc"]))
        .unwrap_or("desc");
    sql.push_str(&format!(" ORDER BY {sort} {order}"));

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return store_failure("topics: prepare list", e),
    };
    let rows = if let Some(term) = search {
        let pattern = format!("%{}%", term);
        stmt.query_map([&pattern], topic_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    } else {
        stmt.query_map([], topic_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    };
    match rows {
        Ok(topics) => ok(json!(topics)),
        Err(e) => store_failure("topics: list query", e),
    }
}

fn get_topic(conn: &Connection, topic_id: &str) -> Response {
    if topic_id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Topic ID is required");
    }
    let found = conn
        .query_row(
            "SELECT topic_id, subject, message, author, created_at FROM topics WHERE topic_id = ?",
            [topic_id],
            topic_row,
        )
        .optional();
    match found {
        Ok(Some(topic)) => ok(topic),
        Ok(None) => fail(StatusCode::NOT_FOUND, "Topic not found"),
        Err(e) => store_failure("topics: select one", e),
    }
}

fn create_topic(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "subject").is_none()
        || body_str(body, "message").is_none()
        || body_str(body, "author").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "subject, message and author are required",
        );
    }
    let subject = sanitize(body_str(body, "subject").unwrap_or_default());
    let message = sanitize(body_str(body, "message").unwrap_or_default());
    let author = sanitize(body_str(body, "author").unwrap_or_default());

    let topic_id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO topics(topic_id, subject, message, author, created_at)
             VALUES(?, ?, ?, ?, {NOW})"
        ),
        (&topic_id, &subject, &message, &author),
    );
    match insert {
        Ok(_) => created(
            "Topic created successfully",
            json!({
                "topic_id": topic_id,
                "subject": subject,
                "message": message,
                "author": author,
            }),
        ),
        Err(e) => store_failure("topics: insert", e),
    }
}

fn update_topic(conn: &Connection, body: &Map<String, Value>) -> Response {
    let Some(topic_id) = body_str(body, "topic_id") else {
        return fail(StatusCode::BAD_REQUEST, "Topic ID is required");
    };
    let topic_id = topic_id.to_string();

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM topics WHERE topic_id = ?",
            [&topic_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("topics: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Topic not found");
    }

    // Blank values are skipped rather than rejected; a topic never loses
    // its subject or message through an update.
    let mut set_parts: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    if let Some(subject) = body_str(body, "subject") {
        set_parts.push("subject = ?");
        values.push(sanitize(subject));
    }
    if let Some(message) = body_str(body, "message") {
        set_parts.push("message = ?");
        values.push(sanitize(message));
    }

    if set_parts.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "No fields to update");
    }

    values.push(topic_id);
    let sql = format!(
        "UPDATE topics SET {} WHERE topic_id = ?",
        set_parts.join(", ")
    );
    match conn.execute(&sql, rusqlite::params_from_iter(values.iter())) {
        Ok(0) => ok_message("No changes made to the topic"),
        Ok(_) => ok_message("Topic updated successfully"),
        Err(e) => store_failure("topics: update", e),
    }
}

fn delete_topic(conn: &Connection, topic_id: Option<&str>) -> Response {
    let Some(topic_id) = topic_id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Topic ID is required");
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM topics WHERE topic_id = ?", [topic_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("topics: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Topic not found");
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return store_failure("topics: begin delete", e),
    };
    if let Err(e) = tx.execute("DELETE FROM replies WHERE topic_id = ?", [topic_id]) {
        let _ = tx.rollback();
        return store_failure("topics: delete replies", e);
    }
    let deleted = match tx.execute("DELETE FROM topics WHERE topic_id = ?", [topic_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_failure("topics: delete", e);
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete topic");
    }
    if let Err(e) = tx.commit() {
        return store_failure("topics: commit delete", e);
    }
    ok_message("Topic and associated replies deleted successfully")
}

fn list_replies(conn: &Connection, topic_id: &str) -> Response {
    if topic_id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Topic ID is required");
    }
    let mut stmt = match conn.prepare(
        "SELECT reply_id, topic_id, text, author, created_at
         FROM replies WHERE topic_id = ?
         ORDER BY created_at ASC, rowid ASC",
    ) {
        Ok(s) => s,
        Err(e) => return store_failure("replies: prepare list", e),
    };
    let rows = stmt
        .query_map([topic_id], |row| {
            let reply_id: String = row.get(0)?;
            let topic_id: String = row.get(1)?;
            let text: String = row.get(2)?;
            let author: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "reply_id": reply_id,
                "topic_id": topic_id,
                "text": text,
                "author": author,
                "created_at": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(replies) => ok(json!(replies)),
        Err(e) => store_failure("replies: list query", e),
    }
}

fn create_reply(conn: &Connection, body: &Map<String, Value>) -> Response {
    if body_str(body, "topic_id").is_none()
        || body_str(body, "text").is_none()
        || body_str(body, "author").is_none()
    {
        return fail(
            StatusCode::BAD_REQUEST,
            "topic_id, text and author are required",
        );
    }
    let topic_id = body_str(body, "topic_id").unwrap_or_default().to_string();
    let text = sanitize(body_str(body, "text").unwrap_or_default());
    let author = sanitize(body_str(body, "author").unwrap_or_default());

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM topics WHERE topic_id = ?", [&topic_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("replies: topic check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Parent topic not found");
    }

    let reply_id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO replies(reply_id, topic_id, text, author, created_at)
             VALUES(?, ?, ?, ?, {NOW})"
        ),
        (&reply_id, &topic_id, &text, &author),
    );
    match insert {
        Ok(_) => created(
            "Reply created successfully",
            json!({
                "reply_id": reply_id,
                "topic_id": topic_id,
                "text": text,
                "author": author,
            }),
        ),
        Err(e) => store_failure("replies: insert", e),
    }
}

fn delete_reply(conn: &Connection, reply_id: Option<&str>) -> Response {
    let Some(reply_id) = reply_id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Reply ID is required");
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM replies WHERE reply_id = ?", [reply_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("replies: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Reply not found");
    }

    match conn.execute("DELETE FROM replies WHERE reply_id = ?", [reply_id]) {
        Ok(0) => fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete reply"),
        Ok(_) => ok_message("Reply deleted successfully"),
        Err(e) => store_failure("replies: delete", e),
    }
}
