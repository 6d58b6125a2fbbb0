use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

async fn spawn_server(prefix: &str) -> String {
    let data_dir = temp_dir(prefix);
    let conn = classhubd::db::open_db(&data_dir).expect("open db");
    let state = Arc::new(classhubd::http::AppState {
        db: Mutex::new(conn),
    });
    let app = classhubd::http::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

async fn get(base: &str, path_query: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("{base}{path_query}"))
        .await
        .expect("send get");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("parse response json"))
}

async fn post(base: &str, path_query: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path_query}"))
        .json(&body)
        .send()
        .await
        .expect("send post");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("parse response json"))
}

async fn put(base: &str, path_query: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .put(format!("{base}{path_query}"))
        .json(&body)
        .send()
        .await
        .expect("send put");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("parse response json"))
}

async fn delete(base: &str, path_query: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .delete(format!("{base}{path_query}"))
        .send()
        .await
        .expect("send delete");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("parse response json"))
}

#[tokio::test]
async fn student_create_get_update_delete_cycle() {
    let base = spawn_server("classhub-students-crud").await;

    let (status, body) = post(
        &base,
        "/api/students",
        json!({
            "student_id": "S1",
            "name": "Alice Park",
            "email": "alice@example.com",
            "password": "first-password"
        }),
    )
    .await;
    assert_eq!(status, 201, "create failed: {body}");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["student_id"], json!("S1"));
    assert!(
        body["data"].get("password").is_none() && body["data"].get("password_hash").is_none(),
        "password material must never be echoed: {body}"
    );

    let (status, body) = get(&base, "/api/students?student_id=S1").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], json!("Alice Park"));
    assert_eq!(body["data"]["email"], json!("alice@example.com"));
    assert!(
        body["data"].get("password_hash").is_none(),
        "hash leaked: {body}"
    );

    // Partial update: email changes, name stays.
    let (status, body) = put(
        &base,
        "/api/students",
        json!({ "student_id": "S1", "email": "alice.park@example.com" }),
    )
    .await;
    assert_eq!(status, 200, "update failed: {body}");

    let (_, body) = get(&base, "/api/students?student_id=S1").await;
    assert_eq!(body["data"]["email"], json!("alice.park@example.com"));
    assert_eq!(body["data"]["name"], json!("Alice Park"));

    let (status, body) = delete(&base, "/api/students?student_id=S1").await;
    assert_eq!(status, 200, "delete failed: {body}");

    let (status, _) = get(&base, "/api/students?student_id=S1").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn duplicate_student_id_conflicts() {
    let base = spawn_server("classhub-students-conflict").await;

    let first = json!({
        "student_id": "S1",
        "name": "Alice Park",
        "email": "alice@example.com",
        "password": "first-password"
    });
    let (status, _) = post(&base, "/api/students", first).await;
    assert_eq!(status, 201);

    let same_id = json!({
        "student_id": "S1",
        "name": "Someone Else",
        "email": "other@example.com",
        "password": "other-password"
    });
    let (status, body) = post(&base, "/api/students", same_id).await;
    assert_eq!(status, 409, "expected conflict: {body}");
    assert_eq!(body["success"], json!(false));

    let same_email = json!({
        "student_id": "S2",
        "name": "Someone Else",
        "email": "alice@example.com",
        "password": "other-password"
    });
    let (status, _) = post(&base, "/api/students", same_email).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn create_validates_required_fields_and_email() {
    let base = spawn_server("classhub-students-validate").await;

    let (status, body) = post(
        &base,
        "/api/students",
        json!({ "student_id": "S1", "name": "Alice" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], json!("Missing required field: email"));

    let (status, body) = post(
        &base,
        "/api/students",
        json!({
            "student_id": "S1",
            "name": "Alice",
            "email": "not-an-email",
            "password": "whatever1"
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], json!("Invalid email format"));
}

#[tokio::test]
async fn update_requires_id_and_at_least_one_field() {
    let base = spawn_server("classhub-students-update-empty").await;

    let (status, body) = put(&base, "/api/students", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], json!("Student ID is required"));

    let (status, _) = post(
        &base,
        "/api/students",
        json!({
            "student_id": "S1",
            "name": "Alice",
            "email": "alice@example.com",
            "password": "first-password"
        }),
    )
    .await;
    assert_eq!(status, 201);

    let (status, body) = put(&base, "/api/students", json!({ "student_id": "S1" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], json!("No fields to update"));

    let (status, _) = put(
        &base,
        "/api/students",
        json!({ "student_id": "missing", "name": "X" }),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn update_email_conflict_excludes_own_record() {
    let base = spawn_server("classhub-students-email-conflict").await;

    for (sid, email) in [("S1", "alice@example.com"), ("S2", "bob@example.com")] {
        let (status, _) = post(
            &base,
            "/api/students",
            json!({
                "student_id": sid,
                "name": "Someone",
                "email": email,
                "password": "first-password"
            }),
        )
        .await;
        assert_eq!(status, 201);
    }

    // Taking another student's email is a conflict.
    let (status, body) = put(
        &base,
        "/api/students",
        json!({ "student_id": "S2", "email": "alice@example.com" }),
    )
    .await;
    assert_eq!(status, 409, "expected conflict: {body}");
    assert_eq!(body["message"], json!("Email already exists"));

    // Re-submitting your own email is a no-op success.
    let (status, _) = put(
        &base,
        "/api/students",
        json!({ "student_id": "S2", "email": "bob@example.com" }),
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn list_reports_count_alongside_data() {
    let base = spawn_server("classhub-students-list-count").await;

    for i in 1..=3 {
        let (status, _) = post(
            &base,
            "/api/students",
            json!({
                "student_id": format!("S{i}"),
                "name": format!("Student {i}"),
                "email": format!("s{i}@example.com"),
                "password": "first-password"
            }),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (status, body) = get(&base, "/api/students").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], json!(3));
    assert_eq!(body["data"].as_array().expect("data array").len(), 3);
}
