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

#[tokio::test]
async fn options_preflight_short_circuits_to_empty_200() {
    let base = spawn_server("classhub-preflight").await;

    for path in [
        "/api/students",
        "/api/assignments",
        "/api/discussion",
        "/api/weekly",
    ] {
        let resp = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{base}{path}"))
            .send()
            .await
            .expect("send options");
        assert_eq!(resp.status().as_u16(), 200, "preflight on {path}");
        assert_eq!(
            resp.headers()
                .get("Access-Control-Allow-Origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert_eq!(
            resp.headers()
                .get("Access-Control-Allow-Methods")
                .and_then(|v| v.to_str().ok()),
            Some("GET, POST, PUT, DELETE, OPTIONS")
        );
        let body = resp.bytes().await.expect("read body");
        assert!(body.is_empty(), "preflight body must be empty");
    }
}

#[tokio::test]
async fn cors_headers_ride_on_every_response() {
    let base = spawn_server("classhub-cors").await;

    let resp = reqwest::get(format!("{base}/api/students"))
        .await
        .expect("send get");
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Headers")
            .and_then(|v| v.to_str().ok()),
        Some("Content-Type, Authorization")
    );
}

#[tokio::test]
async fn unknown_and_missing_resources_are_rejected() {
    let base = spawn_server("classhub-bad-resource").await;

    let resp = reqwest::get(format!("{base}/api/assignments?resource=quizzes"))
        .await
        .expect("send get");
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.expect("parse response json");
    assert_eq!(body["message"], json!("Invalid resource"));

    let resp = reqwest::get(format!("{base}/api/assignments"))
        .await
        .expect("send get");
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.expect("parse response json");
    assert_eq!(body["message"], json!("resource is required"));

    let resp = reqwest::get(format!("{base}/api/discussion?resource=polls"))
        .await
        .expect("send get");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn unsupported_method_for_a_known_resource_is_405() {
    let base = spawn_server("classhub-405").await;

    // Comments have no update operation.
    let resp = reqwest::Client::new()
        .put(format!("{base}/api/assignments?resource=comments"))
        .json(&json!({ "id": "c1", "text": "edited" }))
        .send()
        .await
        .expect("send put");
    assert_eq!(resp.status().as_u16(), 405);
    let body: Value = resp.json().await.expect("parse response json");
    assert_eq!(body["success"], json!(false));

    let resp = reqwest::Client::new()
        .put(format!("{base}/api/discussion?resource=replies"))
        .json(&json!({ "reply_id": "r1" }))
        .send()
        .await
        .expect("send put");
    assert_eq!(resp.status().as_u16(), 405);
}

#[tokio::test]
async fn malformed_json_bodies_are_a_400_not_a_500() {
    let base = spawn_server("classhub-bad-json").await;

    for (path, method) in [
        ("/api/students", reqwest::Method::POST),
        ("/api/students", reqwest::Method::PUT),
        ("/api/assignments?resource=assignments", reqwest::Method::POST),
        ("/api/weekly?resource=weeks", reqwest::Method::PUT),
    ] {
        let resp = reqwest::Client::new()
            .request(method.clone(), format!("{base}{path}"))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .expect("send malformed body");
        assert_eq!(
            resp.status().as_u16(),
            400,
            "{method} {path} must reject malformed JSON"
        );
        let body: Value = resp.json().await.expect("parse response json");
        assert_eq!(body["message"], json!("Invalid JSON body"));
    }

    // A JSON scalar is not a request object either.
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/students"))
        .header("Content-Type", "application/json")
        .body("42")
        .send()
        .await
        .expect("send scalar body");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_paths_fall_through_to_a_json_404() {
    let base = spawn_server("classhub-unknown-path").await;

    let resp = reqwest::get(format!("{base}/api/gradebook"))
        .await
        .expect("send get");
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.expect("parse response json");
    assert_eq!(body["success"], json!(false));
}
