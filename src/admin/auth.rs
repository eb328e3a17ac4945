//! Access-token check and CORS for the admin API.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::admin::AdminState;
use crate::http::response::json_error;

pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let cors = cors_headers(request.headers());

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else if is_authorized(request.headers(), &state.token) {
        next.run(request).await
    } else {
        tracing::warn!(method = %request.method(), path = %request.uri().path(), "Invalid access token.");
        json_error(StatusCode::UNAUTHORIZED, "Invalid access token.")
    };

    response.headers_mut().extend(cors);
    response
}

/// Accepts the raw token or `Bearer <token>`.
pub fn is_authorized(headers: &HeaderMap, token: &str) -> bool {
    let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let presented = value.strip_prefix("Bearer ").unwrap_or(value);
    !token.is_empty() && presented == token
}

/// Reflect the caller's origin, method and headers.
fn cors_headers(request: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );

    let reflected = [
        (header::ORIGIN, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        (header::ACCESS_CONTROL_REQUEST_METHOD, header::ACCESS_CONTROL_ALLOW_METHODS),
        (header::ACCESS_CONTROL_REQUEST_HEADERS, header::ACCESS_CONTROL_ALLOW_HEADERS),
    ];
    for (from, to) in reflected {
        if let Some(value) = request.get(&from) {
            headers.insert(to, value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_with_or_without_bearer() {
        let mut headers = HeaderMap::new();
        assert!(!is_authorized(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("secret"));
        assert!(is_authorized(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert!(is_authorized(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert!(!is_authorized(&headers, "secret"));
    }

    #[test]
    fn reflects_preflight_headers() {
        let mut request = HeaderMap::new();
        request.insert(header::ORIGIN, HeaderValue::from_static("https://console.example"));
        request.insert(header::ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("PATCH"));

        let cors = cors_headers(&request);
        assert_eq!(cors[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://console.example");
        assert_eq!(cors[header::ACCESS_CONTROL_ALLOW_METHODS], "PATCH");
        assert_eq!(cors[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert!(!cors.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }
}
