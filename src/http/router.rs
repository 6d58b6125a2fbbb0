use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use super::error::fail;
use super::handlers::{assignments, discussion, students, weekly};
use super::types::AppState;

/// Builds the service router: one path per endpoint domain, dispatching by
/// method (and, inside the handlers, by the `resource` query parameter).
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/students",
            get(students::list_or_get)
                .post(students::create_or_change_password)
                .put(students::update)
                .delete(students::delete),
        )
        .route(
            "/api/assignments",
            get(assignments::dispatch_get)
                .post(assignments::dispatch_post)
                .put(assignments::dispatch_put)
                .delete(assignments::dispatch_delete),
        )
        .route(
            "/api/discussion",
            get(discussion::dispatch_get)
                .post(discussion::dispatch_post)
                .put(discussion::dispatch_put)
                .delete(discussion::dispatch_delete),
        )
        .route(
            "/api/weekly",
            get(weekly::dispatch_get)
                .post(weekly::dispatch_post)
                .put(weekly::dispatch_put)
                .delete(weekly::dispatch_delete),
        )
        .fallback(unknown_path)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

async fn unknown_path() -> Response {
    fail(StatusCode::NOT_FOUND, "Not found")
}

/// Applies the CORS headers to every response and short-circuits preflight
/// `OPTIONS` requests to an empty 200 before any routing or store access.
async fn cors(req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    resp
}
