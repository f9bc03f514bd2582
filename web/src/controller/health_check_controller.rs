use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

/// GET /api/
pub async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

/// Fallback for unmatched routes. API clients get a JSON body.
pub async fn not_found(uri: Uri) -> Response {
    if uri.path() == "/api" || uri.path().starts_with("/api/") {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "API endpoint not found" })),
        )
            .into_response()
    } else {
        (StatusCode::NOT_FOUND, "NOT FOUND").into_response()
    }
}
