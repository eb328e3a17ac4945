//! Reverse-proxy behaviour.
//!
//! # Responsibilities
//! - Pick an upstream by hashing the request host
//! - Forward method, headers and streamed body to `upstream + request URI`
//! - Relay status, headers and body back, rewriting `Location`
//!
//! # Design Decisions
//! - The client never follows redirects; 3xx responses pass through
//! - Inbound headers are copied last-value-wins; `Host` comes from the upstream URL
//! - Upstream failures become 502 at the call site instead of a hung client

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, Uri},
    response::Response,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::{Position, Url};

use crate::config::schema::HostConfig;
use crate::load_balancer::select;
use crate::net::tls::crypto_provider;
use crate::routing::request_host;

/// Shared outbound client for every reverse-proxy host.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("host '{0}' has no forward urls")]
    NoTargets(String),

    #[error("invalid upstream uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("upstream TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// Build the upstream client for `http://` and `https://` targets.
pub fn build_client(connect_timeout: Duration) -> Result<UpstreamClient, UpstreamError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(connect_timeout));

    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(crypto_provider())?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new()).build(https))
}

/// Forward `request` to the upstream selected for its host.
pub async fn forward(
    client: &UpstreamClient,
    host: &HostConfig,
    request: Request<Body>,
) -> Result<Response, UpstreamError> {
    let target = select(request_host(&request).as_bytes(), &host.forward_urls)
        .ok_or_else(|| UpstreamError::NoTargets(host.name.clone()))?
        .clone();

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let raw_uri = format!("{}{}", target, path_and_query);
    let uri: Uri = raw_uri
        .parse()
        .map_err(|source| UpstreamError::InvalidUri { uri: raw_uri.clone(), source })?;

    tracing::debug!(host = %host.name, method = %parts.method, upstream = %uri, "Proxying request");

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    let headers = outbound.headers_mut();
    for (name, value) in parts.headers.iter() {
        if name == header::HOST {
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }

    let response = client.request(outbound).await?;
    let (mut parts, body) = response.into_parts();
    rewrite_location_headers(&mut parts.headers, &target);

    Ok(Response::from_parts(parts, Body::new(body)))
}

fn rewrite_location_headers(headers: &mut HeaderMap, target: &str) {
    let values: Vec<HeaderValue> = headers.get_all(header::LOCATION).iter().cloned().collect();
    if values.is_empty() {
        return;
    }

    headers.remove(header::LOCATION);
    for value in values {
        let rewritten = value
            .to_str()
            .ok()
            .map(|location| rewrite_location(location, target))
            .and_then(|location| HeaderValue::from_str(&location).ok());
        headers.append(header::LOCATION, rewritten.unwrap_or(value));
    }
}

/// Make an upstream redirect relative to the proxy.
///
/// A location on the upstream's own origin (same scheme, host and effective
/// port) keeps only its path, query and fragment. Anything else has the
/// literal forward target removed.
pub fn rewrite_location(location: &str, target: &str) -> String {
    if let (Ok(loc), Ok(upstream)) = (Url::parse(location), Url::parse(target)) {
        let same_origin = loc.scheme() == upstream.scheme()
            && loc.host_str() == upstream.host_str()
            && loc.port_or_known_default() == upstream.port_or_known_default();
        if same_origin {
            return loc[Position::BeforePath..].to_string();
        }
    }
    location.replace(target, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_location_becomes_path() {
        assert_eq!(
            rewrite_location("http://backend:80/next", "http://backend:80"),
            "/next"
        );
        assert_eq!(
            rewrite_location("http://backend/next?a=1#top", "http://backend:80"),
            "/next?a=1#top"
        );
        assert_eq!(
            rewrite_location("https://api.internal:443/v1", "https://api.internal"),
            "/v1"
        );
    }

    #[test]
    fn foreign_origin_only_loses_literal_target() {
        assert_eq!(
            rewrite_location("http://other:80/x", "http://backend:80"),
            "http://other:80/x"
        );
        assert_eq!(
            rewrite_location("https://backend/login", "http://backend"),
            "https://backend/login"
        );
        assert_eq!(
            rewrite_location("/relative?next=http://backend:8080/a", "http://backend:8080"),
            "/relative?next=/a"
        );
    }

    #[test]
    fn different_port_is_not_same_origin() {
        assert_eq!(
            rewrite_location("http://backend:8081/x", "http://backend:8080"),
            "http://backend:8081/x"
        );
    }

    #[test]
    fn rewrites_every_location_value() {
        let mut headers = HeaderMap::new();
        headers.append(header::LOCATION, HeaderValue::from_static("http://b:80/one"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        rewrite_location_headers(&mut headers, "http://b:80");

        assert_eq!(headers[header::LOCATION], "/one");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }
}
