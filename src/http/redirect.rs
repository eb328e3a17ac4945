//! Permanent redirect behaviour.

use axum::{
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::config::schema::HostConfig;
use crate::http::response::json_error;

/// 301 to `redirect_url` followed by the original path and query, verbatim.
pub fn redirect(host: &HostConfig, uri: &Uri) -> Response {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let location = format!("{}{}", host.redirect_url, path_and_query);

    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::warn!(host = %host.name, location = %location, "Invalid redirect location");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invalid redirect location")
        }
    }
}
