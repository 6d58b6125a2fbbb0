//! Student roster: list/search, get, signup, profile update, delete, and
//! password change. Students are addressed by their university-issued
//! `student_id`; the surrogate row id never leaves the store.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{hash_password, verify_password, NOW};
use crate::http::error::{created, fail, ok, ok_message, store_failure};
use crate::http::types::{body_str, parse_body, AppState, ResourceQuery};
use crate::validate::{allowed_value, sanitize, valid_email};

const SORT_COLUMNS: &[&str] = &["name", "student_id", "email", "created_at"];
const DEFAULT_SORT: &str = "created_at";

pub async fn list_or_get(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
) -> Response {
    info!("GET /api/students");
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("students: database lock", e),
    };
    match q.student_id.as_deref() {
        Some(student_id) => get_student(&conn, student_id),
        None => list_students(&conn, &q),
    }
}

pub async fn create_or_change_password(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("POST /api/students");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("students: database lock", e),
    };
    if q.action.as_deref() == Some("change_password") {
        change_password(&conn, &body)
    } else {
        create_student(&conn, &body)
    }
}

pub async fn update(State(state): State<Arc<AppState>>, bytes: Bytes) -> Response {
    info!("PUT /api/students");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("students: database lock", e),
    };
    update_student(&conn, &body)
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResourceQuery>,
    bytes: Bytes,
) -> Response {
    info!("DELETE /api/students");
    let body = match parse_body(&bytes) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    // The id may arrive in the query string or the body; query wins.
    let student_id = q
        .student_id
        .clone()
        .or_else(|| body_str(&body, "student_id").map(str::to_string));
    let conn = match state.db.lock() {
        Ok(c) => c,
        Err(e) => return store_failure("students: database lock", e),
    };
    delete_student(&conn, student_id.as_deref())
}

fn list_students(conn: &Connection, q: &ResourceQuery) -> Response {
    let mut sql = String::from("SELECT student_id, name, email, created_at FROM students");
    let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if search.is_some() {
        sql.push_str(" WHERE name LIKE ?1 OR student_id LIKE ?1 OR email LIKE ?1");
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
        Err(e) => return store_failure("students: prepare list", e),
    };
    let row_to_json = |row: &rusqlite::Row<'_>| {
        let student_id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let email: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok(json!({
            "student_id": student_id,
            "name": name,
            "email": email,
            "created_at": created_at,
        }))
    };
    let rows = if let Some(term) = search {
        let pattern = format!("%{}%", term);
        stmt.query_map([&pattern], row_to_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    } else {
        stmt.query_map([], row_to_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    };

    match rows {
        Ok(students) => {
            let count = students.len();
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": students,
                    "count": count,
                })),
            )
                .into_response()
        }
        Err(e) => store_failure("students: list query", e),
    }
}

fn get_student(conn: &Connection, student_id: &str) -> Response {
    if student_id.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Student ID is required");
    }
    let found = conn
        .query_row(
            "SELECT student_id, name, email, created_at FROM students WHERE student_id = ?",
            [student_id],
            |row| {
                let student_id: String = row.get(0)?;
                let name: String = row.get(1)?;
                let email: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok(json!({
                    "student_id": student_id,
                    "name": name,
                    "email": email,
                    "created_at": created_at,
                }))
            },
        )
        .optional();
    match found {
        Ok(Some(student)) => ok(student),
        Ok(None) => fail(StatusCode::NOT_FOUND, "Student not found"),
        Err(e) => store_failure("students: select one", e),
    }
}

fn create_student(conn: &Connection, body: &Map<String, Value>) -> Response {
    for field in ["student_id", "name", "email", "password"] {
        if body_str(body, field).is_none() {
            return fail(
                StatusCode::BAD_REQUEST,
                format!("Missing required field: {field}"),
            );
        }
    }
    let student_id = sanitize(body_str(body, "student_id").unwrap_or_default());
    let name = sanitize(body_str(body, "name").unwrap_or_default());
    let email = sanitize(body_str(body, "email").unwrap_or_default());
    let password = body
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if !valid_email(&email) {
        return fail(StatusCode::BAD_REQUEST, "Invalid email format");
    }

    let duplicate: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ? OR email = ?",
            (&student_id, &email),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("students: uniqueness check", e),
    };
    if duplicate.is_some() {
        return fail(
            StatusCode::CONFLICT,
            "Student ID or email already exists",
        );
    }

    let password_hash = match hash_password(password) {
        Ok(h) => h,
        Err(e) => return store_failure("students: hash password", e),
    };

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        &format!(
            "INSERT INTO students(id, student_id, name, email, password_hash, created_at)
             VALUES(?, ?, ?, ?, ?, {NOW})"
        ),
        (&id, &student_id, &name, &email, &password_hash),
    );
    match insert {
        Ok(_) => created(
            "Student created successfully",
            json!({
                "student_id": student_id,
                "name": name,
                "email": email,
            }),
        ),
        // The schema UNIQUE constraints back-stop the pre-check above.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            fail(StatusCode::CONFLICT, "Student ID or email already exists")
        }
        Err(e) => store_failure("students: insert", e),
    }
}

fn update_student(conn: &Connection, body: &Map<String, Value>) -> Response {
    let Some(student_id) = body_str(body, "student_id") else {
        return fail(StatusCode::BAD_REQUEST, "Student ID is required");
    };
    let student_id = sanitize(student_id);

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("students: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Student not found");
    }

    let mut set_parts: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(v) = body.get("name") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "name must be a string");
        };
        set_parts.push("name = ?");
        values.push(sanitize(s));
    }
    if let Some(v) = body.get("email") {
        let Some(s) = v.as_str() else {
            return fail(StatusCode::BAD_REQUEST, "email must be a string");
        };
        let email = sanitize(s);
        if !valid_email(&email) {
            return fail(StatusCode::BAD_REQUEST, "Invalid email format");
        }
        let taken: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM students WHERE email = ? AND student_id != ?",
                (&email, &student_id),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return store_failure("students: email uniqueness check", e),
        };
        if taken.is_some() {
            return fail(StatusCode::CONFLICT, "Email already exists");
        }
        set_parts.push("email = ?");
        values.push(email);
    }

    if set_parts.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "No fields to update");
    }

    values.push(student_id);
    let sql = format!(
        "UPDATE students SET {} WHERE student_id = ?",
        set_parts.join(", ")
    );
    match conn.execute(&sql, rusqlite::params_from_iter(values.iter())) {
        // A no-op update (same values) still reports success.
        Ok(_) => ok_message("Student updated successfully"),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            fail(StatusCode::CONFLICT, "Email already exists")
        }
        Err(e) => store_failure("students: update", e),
    }
}

fn delete_student(conn: &Connection, student_id: Option<&str>) -> Response {
    let Some(student_id) = student_id.map(str::trim).filter(|s| !s.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Student ID is required");
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("students: existence check", e),
    };
    if exists.is_none() {
        return fail(StatusCode::NOT_FOUND, "Student not found");
    }

    match conn.execute("DELETE FROM students WHERE student_id = ?", [student_id]) {
        Ok(0) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete student",
        ),
        Ok(_) => ok_message("Student deleted successfully"),
        Err(e) => store_failure("students: delete", e),
    }
}

fn change_password(conn: &Connection, body: &Map<String, Value>) -> Response {
    for field in ["student_id", "current_password", "new_password"] {
        if body_str(body, field).is_none() {
            return fail(
                StatusCode::BAD_REQUEST,
                format!("Missing required field: {field}"),
            );
        }
    }
    let student_id = sanitize(body_str(body, "student_id").unwrap_or_default());
    let current_password = body
        .get("current_password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let new_password = body
        .get("new_password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if new_password.len() < 8 {
        return fail(
            StatusCode::BAD_REQUEST,
            "New password must be at least 8 characters long",
        );
    }

    let stored_hash: Option<String> = match conn
        .query_row(
            "SELECT password_hash FROM students WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return store_failure("students: select password hash", e),
    };
    let Some(stored_hash) = stored_hash else {
        return fail(StatusCode::NOT_FOUND, "Student not found");
    };

    if !verify_password(current_password, &stored_hash) {
        return fail(StatusCode::UNAUTHORIZED, "Current password is incorrect");
    }

    let new_hash = match hash_password(new_password) {
        Ok(h) => h,
        Err(e) => return store_failure("students: hash password", e),
    };
    match conn.execute(
        "UPDATE students SET password_hash = ? WHERE student_id = ?",
        (&new_hash, &student_id),
    ) {
        Ok(_) => ok_message("Password updated successfully"),
        Err(e) => store_failure("students: update password", e),
    }
}
