//! Response helpers shared by the data plane and the admin API.
//!
//! # Design Decisions
//! - Errors are JSON objects with a single `err` field
//! - The directory-listing miss keeps the plain-text body clients expect

use std::fmt::Display;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// `{"err": "<message>"}` with the given status.
pub fn json_error(status: StatusCode, message: impl Display) -> Response {
    let body = serde_json::json!({ "err": message.to_string() });
    (status, Json(body)).into_response()
}

/// Empty JSON object, the success body of the admin API.
pub fn json_ok() -> Response {
    Json(serde_json::json!({})).into_response()
}

/// Plain 404 used when a directory listing is suppressed.
pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "404 page not found",
    )
        .into_response()
}
