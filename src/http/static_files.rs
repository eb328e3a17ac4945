//! Static file behaviour.
//!
//! # Responsibilities
//! - Serve files below a host's `path` (ranges, content types, index.html)
//! - Suppress directory listings when `disable_dir_listing` is set
//! - Render a plain listing for directories without an index otherwise
//!
//! # Design Decisions
//! - File serving is delegated to `tower_http::services::ServeDir`
//! - Request paths are decoded and checked for `..` before touching the disk

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::config::schema::HostConfig;
use crate::http::response::not_found;

/// Characters escaped in listing links.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub async fn serve(host: &HostConfig, request: Request<Body>) -> Response {
    let raw_path = request.uri().path().to_string();
    let Some(relative) = decode_path(&raw_path) else {
        return not_found();
    };

    if raw_path.ends_with('/') {
        let dir = Path::new(&host.path).join(&relative);
        if !index_file_exists(&dir).await {
            if host.disable_dir_listing {
                return not_found();
            }
            let listable = matches!(*request.method(), Method::GET | Method::HEAD);
            if listable && is_dir(&dir).await {
                return list_directory(&dir).await;
            }
        }
    }

    match ServeDir::new(&host.path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Decode a request path into a relative filesystem path.
///
/// Returns `None` for paths that are not valid UTF-8 or climb above the root.
pub fn decode_path(raw: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let mut path = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            other => {
                if other.contains('\\') {
                    return None;
                }
                path.push(other);
            }
        }
    }
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return None;
    }
    Some(path)
}

/// True when `<dir>/index.html` exists and is a regular file.
pub async fn index_file_exists(dir: &Path) -> bool {
    tokio::fs::metadata(dir.join("index.html"))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn list_directory(dir: &Path) -> Response {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading directory").into_response();
        }
    };

    let mut names = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    name.push('/');
                }
                names.push(name);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory entry");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading directory").into_response();
            }
        }
    }
    names.sort();

    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );
    for name in &names {
        html.push_str(&format!(
            "<a href=\"{}\">{}</a>\n",
            utf8_percent_encode(name, HREF),
            escape_html(name)
        ));
    }
    html.push_str("</pre>\n");

    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(host: &HostConfig, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = serve(host, request).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn decodes_and_rejects_traversal() {
        assert_eq!(decode_path("/a%20b/c.txt"), Some(PathBuf::from("a b/c.txt")));
        assert_eq!(decode_path("/"), Some(PathBuf::new()));
        assert_eq!(decode_path("/a/../../etc/passwd"), None);
        assert_eq!(decode_path("/%2e%2e/secret"), None);
    }

    #[tokio::test]
    async fn suppressed_listing_without_index_is_404() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("docs")).unwrap();
        std::fs::write(root.path().join("docs/readme.txt"), "hi").unwrap();

        let mut host = HostConfig::serve_static("a", root.path().to_string_lossy());
        host.disable_dir_listing = true;

        let (status, body) = get(&host, "/docs/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found");
    }

    #[tokio::test]
    async fn suppressed_listing_with_index_serves_it() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();

        let mut host = HostConfig::serve_static("a", root.path().to_string_lossy());
        host.disable_dir_listing = true;

        let (status, body) = get(&host, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn index_directory_does_not_count_as_index() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("index.html")).unwrap();

        let mut host = HostConfig::serve_static("a", root.path().to_string_lossy());
        host.disable_dir_listing = true;

        assert_eq!(get(&host, "/").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_directory_when_allowed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        std::fs::write(root.path().join("a b.txt"), "x").unwrap();

        let host = HostConfig::serve_static("a", root.path().to_string_lossy());
        let (status, body) = get(&host, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<a href=\"a%20b.txt\">a b.txt</a>"));
        assert!(body.contains("<a href=\"sub/\">sub/</a>"));
    }

    #[tokio::test]
    async fn serves_plain_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("style.css"), "body{}").unwrap();

        let host = HostConfig::serve_static("a", root.path().to_string_lossy());
        let request = Request::builder().uri("/style.css").body(Body::empty()).unwrap();
        let response = serve(&host, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

        assert_eq!(get(&host, "/missing.css").await.0, StatusCode::NOT_FOUND);
    }
}
