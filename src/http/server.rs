//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router of one HTTP/HTTPS server
//! - Wire up middleware (tracing, request ID, `Server` header)
//! - Dispatch every request to its host's behaviour by Host header
//!
//! # Design Decisions
//! - A single fallback handler: hosts, not paths, select the behaviour
//! - The routing table is immutable once the router is built
//! - The outbound client is shared by every server of the engine

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::schema::HostKind;
use crate::http::proxy::{self, UpstreamClient};
use crate::http::redirect::redirect;
use crate::http::response::json_error;
use crate::http::static_files;
use crate::observability::metrics;
use crate::routing::{request_host, strip_port, HostTable};

/// Everything a request needs once it reaches a server.
#[derive(Debug)]
pub struct RoutingContext {
    pub server: String,
    pub table: HostTable,
    pub client: UpstreamClient,
}

impl RoutingContext {
    pub fn new(server: impl Into<String>, table: HostTable, client: UpstreamClient) -> Self {
        Self {
            server: server.into(),
            table,
            client,
        }
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(ctx: Arc<RoutingContext>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::SERVER,
            HeaderValue::from_static("hostgate"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Main data-plane handler.
/// Looks up the host and hands the request to its behaviour.
async fn dispatch(State(ctx): State<Arc<RoutingContext>>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let raw_host = request_host(&request).to_string();
    let name = strip_port(&raw_host);

    let host = match ctx.table.resolve(name) {
        Ok(host) => Arc::clone(host),
        Err(miss) => {
            tracing::debug!(server = %ctx.server, host = %raw_host, "{}", miss);
            metrics::record_request(&ctx.server, "none", 400, start_time.elapsed());
            return json_error(StatusCode::BAD_REQUEST, miss);
        }
    };

    let mut response = match host.kind {
        Some(HostKind::ServeStatic) => static_files::serve(&host, request).await,
        Some(HostKind::Redirect) => redirect(&host, request.uri()),
        Some(HostKind::ReverseProxy) => match proxy::forward(&ctx.client, &host, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(server = %ctx.server, host = %host.name, error = %e, "Upstream error");
                json_error(StatusCode::BAD_GATEWAY, e)
            }
        },
        None => json_error(
            StatusCode::BAD_REQUEST,
            format!("Host '{}' has no type", host.name),
        ),
    };

    if !host.allowed_origin.is_empty() {
        match HeaderValue::from_str(&host.allowed_origin) {
            Ok(origin) => {
                response
                    .headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            Err(_) => {
                tracing::warn!(host = %host.name, "allowed_origin is not a valid header value");
            }
        }
    }

    let kind = host.kind.map(|k| k.as_str()).unwrap_or("none");
    metrics::record_request(&ctx.server, kind, response.status().as_u16(), start_time.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HostConfig;
    use crate::http::proxy::build_client;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(hosts: &[HostConfig]) -> Router {
        let client = build_client(Duration::from_secs(1)).unwrap();
        build_router(Arc::new(RoutingContext::new("test", HostTable::build(hosts), client)))
    }

    async fn send(router: &Router, host: &str, path: &str) -> Response {
        let request = Request::builder()
            .uri(path)
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn static_root(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), content).unwrap();
        dir
    }

    #[tokio::test]
    async fn routes_by_host_name() {
        let a = static_root("path A");
        let b = static_root("path B");
        let app = router(&[
            HostConfig::serve_static("a", a.path().to_string_lossy()),
            HostConfig::serve_static("b", b.path().to_string_lossy()),
        ]);

        assert_eq!(body_text(send(&app, "a", "/").await).await, "path A");
        assert_eq!(body_text(send(&app, "b:8080", "/").await).await, "path B");

        let miss = send(&app, "c", "/").await;
        assert_eq!(miss.status(), StatusCode::BAD_REQUEST);
        assert_eq!(miss.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_text(miss).await, r#"{"err":"Host 'c' not found"}"#);
    }

    #[tokio::test]
    async fn last_duplicate_wins_and_disabled_never_shadows() {
        let first = static_root("first");
        let second = static_root("second");
        let mut off = HostConfig::serve_static("x", first.path().to_string_lossy());
        off.disabled = true;
        let app = router(&[
            HostConfig::serve_static("x", first.path().to_string_lossy()),
            HostConfig::serve_static("x", second.path().to_string_lossy()),
            off,
        ]);
        assert_eq!(body_text(send(&app, "x", "/").await).await, "second");
    }

    #[tokio::test]
    async fn disabled_host_is_reported() {
        let mut off = HostConfig::redirect("old", "https://new.example");
        off.disabled = true;
        let app = router(&[off]);
        let response = send(&app, "old", "/").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("is disabled"));
    }

    #[tokio::test]
    async fn redirects_with_full_uri_and_common_headers() {
        let mut host = HostConfig::redirect("r", "https://b.com");
        host.allowed_origin = "https://console.example".into();
        let app = router(&[host]);

        let response = send(&app, "r", "/x?y=1").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://b.com/x?y=1");
        assert_eq!(response.headers()[header::SERVER], "hostgate");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://console.example"
        );
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_502() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = router(&[HostConfig::reverse_proxy("p", [format!("http://{}", addr)])]);
        let response = send(&app, "p", "/").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.starts_with(r#"{"err":"#));
    }
}
