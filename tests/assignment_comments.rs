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

async fn delete(base: &str, path_query: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .delete(format!("{base}{path_query}"))
        .send()
        .await
        .expect("send delete");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("parse response json"))
}

async fn create_assignment(base: &str) -> String {
    let (status, body) = post(
        base,
        "/api/assignments?resource=assignments",
        json!({ "title": "HW1", "description": "x", "due_date": "2025-01-10" }),
    )
    .await;
    assert_eq!(status, 201, "assignment setup failed: {body}");
    body["data"]["id"].as_str().expect("assigned id").to_string()
}

#[tokio::test]
async fn comments_attach_to_an_existing_assignment_in_order() {
    let base = spawn_server("classhub-comments-order").await;
    let assignment_id = create_assignment(&base).await;

    let (status, body) = post(
        &base,
        "/api/assignments?resource=comments",
        json!({
            "assignment_id": "missing",
            "author": "Alice",
            "text": "early bird"
        }),
    )
    .await;
    assert_eq!(status, 404, "unexpected: {body}");
    assert_eq!(body["message"], json!("Assignment not found"));

    for text in ["first!", "second thoughts", "third time lucky"] {
        let (status, body) = post(
            &base,
            "/api/assignments?resource=comments",
            json!({
                "assignment_id": assignment_id,
                "author": "Alice",
                "text": text
            }),
        )
        .await;
        assert_eq!(status, 201, "comment create failed: {body}");
        assert!(!body["data"]["id"].as_str().expect("comment id").is_empty());
    }

    let (status, body) = get(
        &base,
        &format!("/api/assignments?resource=comments&assignment_id={assignment_id}"),
    )
    .await;
    assert_eq!(status, 200);
    let texts: Vec<&str> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|c| c["text"].as_str().expect("text"))
        .collect();
    assert_eq!(texts, vec!["first!", "second thoughts", "third time lucky"]);
}

#[tokio::test]
async fn comment_delete_and_missing_fields() {
    let base = spawn_server("classhub-comments-delete").await;
    let assignment_id = create_assignment(&base).await;

    let (status, body) = post(
        &base,
        "/api/assignments?resource=comments",
        json!({ "assignment_id": assignment_id, "author": "Alice" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(
        body["message"],
        json!("assignment_id, author, and text are required")
    );

    let (_, body) = post(
        &base,
        "/api/assignments?resource=comments",
        json!({ "assignment_id": assignment_id, "author": "Alice", "text": "hello" }),
    )
    .await;
    let comment_id = body["data"]["id"].as_str().expect("comment id").to_string();

    let (status, _) = delete(
        &base,
        &format!("/api/assignments?resource=comments&id={comment_id}"),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = delete(
        &base,
        &format!("/api/assignments?resource=comments&id={comment_id}"),
    )
    .await;
    assert_eq!(status, 404);

    let (status, body) = delete(&base, "/api/assignments?resource=comments").await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], json!("Comment ID is required"));
}

#[tokio::test]
async fn deleting_an_assignment_cascades_to_its_comments() {
    let base = spawn_server("classhub-comments-cascade").await;
    let assignment_id = create_assignment(&base).await;

    for i in 1..=3 {
        let (status, _) = post(
            &base,
            "/api/assignments?resource=comments",
            json!({
                "assignment_id": assignment_id,
                "author": "Alice",
                "text": format!("comment {i}")
            }),
        )
        .await;
        assert_eq!(status, 201);
    }

    let (status, _) = delete(
        &base,
        &format!("/api/assignments?resource=assignments&id={assignment_id}"),
    )
    .await;
    assert_eq!(status, 200);

    // Orphan listing is an empty success, not an error.
    let (status, body) = get(
        &base,
        &format!("/api/assignments?resource=comments&assignment_id={assignment_id}"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"], json!([]));
}
