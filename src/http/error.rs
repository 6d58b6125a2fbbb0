use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub fn ok(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": data })),
    )
        .into_response()
}

pub fn ok_message(message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": message.into() })),
    )
        .into_response()
}

pub fn created(message: impl Into<String>, data: serde_json::Value) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message.into(), "data": data })),
    )
        .into_response()
}

pub fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

/// Logs the store-level cause server-side and returns the generic 500
/// envelope. Raw store error text never reaches the client.
pub fn store_failure(context: &str, cause: impl std::fmt::Display) -> Response {
    tracing::error!("{context}: {cause}");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred")
}
