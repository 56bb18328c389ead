use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use spool_core::EngineError;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

/// 500 with a fixed body: store-specific text goes to the log, never to the
/// client.
pub fn internal_error() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// Default mapping for engine failures that reach a handler: an empty peek
/// is the caller's 404, anything else is a flat 500. The routes using this
/// mapping document no 400s; bad request parameters are rejected before the
/// engine is called.
pub fn engine_error_to_response(err: &EngineError) -> axum::response::Response {
    match err {
        EngineError::NotFound => json_error(StatusCode::NOT_FOUND, "job not found"),
        _ => internal_error(),
    }
}
