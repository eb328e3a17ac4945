//! Virtual-host lookup.
//!
//! # Responsibilities
//! - Build the name → host map for one server start
//! - Resolve a request's host (port stripped) to a host or an explicit miss
//!
//! # Design Decisions
//! - Immutable after construction (shared through `Arc`, no locks)
//! - Host names are matched case-insensitively
//! - Disabled hosts are skipped before duplicates are resolved, so a disabled
//!   entry never shadows an enabled host of the same name
//! - Among enabled hosts the last entry with a given name wins

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::{header, Request};

use crate::config::schema::{HostConfig, ServerConfig};

/// Why a request could not be routed to a host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteMiss {
    #[error("Host '{0}' not found")]
    NotFound(String),

    #[error("Host '{0}' is disabled")]
    Disabled(String),
}

/// Routing table of an HTTP/HTTPS server.
#[derive(Debug, Default)]
pub struct HostTable {
    hosts: HashMap<String, Arc<HostConfig>>,
    disabled: HashSet<String>,
}

impl HostTable {
    pub fn build(hosts: &[HostConfig]) -> Self {
        let mut table = Self::default();
        for host in hosts {
            let key = host.name.to_ascii_lowercase();
            if host.disabled {
                table.disabled.insert(key);
                continue;
            }
            if table.hosts.insert(key, Arc::new(host.clone())).is_some() {
                tracing::warn!(host = %host.name, "Duplicate host name, later entry wins");
            }
        }
        table
    }

    /// Look up a host by name (without port).
    pub fn resolve(&self, name: &str) -> Result<&Arc<HostConfig>, RouteMiss> {
        let key = name.to_ascii_lowercase();
        match self.hosts.get(&key) {
            Some(host) => Ok(host),
            None if self.disabled.contains(&key) => Err(RouteMiss::Disabled(name.to_string())),
            None => Err(RouteMiss::NotFound(name.to_string())),
        }
    }

    /// Number of enabled host names.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Flat upstream list of a TCP server: every enabled host's `upstream`, in order.
pub fn upstream_set(server: &ServerConfig) -> Vec<String> {
    server.enabled_hosts().map(|h| h.upstream.clone()).collect()
}

/// Raw host of a request as the client sent it (port included).
///
/// HTTP/1.1 carries it in the `Host` header, HTTP/2 in the URI authority.
pub fn request_host<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or("")
}

/// Strip an optional `:port` suffix, keeping IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.split_once(':') {
        Some((name, _)) => name,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use crate::config::schema::Protocol;

    fn disabled(mut host: HostConfig) -> HostConfig {
        host.disabled = true;
        host
    }

    #[test]
    fn resolves_by_name() {
        let table = HostTable::build(&[
            HostConfig::serve_static("a", "/srv/a"),
            HostConfig::serve_static("b", "/srv/b"),
        ]);
        assert_eq!(table.resolve("a").unwrap().path, "/srv/a");
        assert_eq!(table.resolve("B").unwrap().path, "/srv/b");
        assert_eq!(table.resolve("c").unwrap_err(), RouteMiss::NotFound("c".into()));
    }

    #[test]
    fn duplicate_names_last_one_wins() {
        let table = HostTable::build(&[
            HostConfig::serve_static("x", "p1"),
            HostConfig::serve_static("x", "p2"),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("x").unwrap().path, "p2");
    }

    #[test]
    fn disabled_host_never_shadows_enabled_one() {
        let enabled_first = HostTable::build(&[
            HostConfig::serve_static("x", "live"),
            disabled(HostConfig::serve_static("x", "off")),
        ]);
        assert_eq!(enabled_first.resolve("x").unwrap().path, "live");

        let disabled_first = HostTable::build(&[
            disabled(HostConfig::serve_static("x", "off")),
            HostConfig::serve_static("x", "live"),
        ]);
        assert_eq!(disabled_first.resolve("x").unwrap().path, "live");
    }

    #[test]
    fn disabled_only_name_reports_disabled() {
        let table = HostTable::build(&[disabled(HostConfig::serve_static("old", "/srv"))]);
        assert!(table.is_empty());
        let miss = table.resolve("old").unwrap_err();
        assert_eq!(miss.to_string(), "Host 'old' is disabled");
    }

    #[test]
    fn tcp_upstreams_skip_disabled_hosts() {
        let server = ServerConfig::new("relay", Protocol::Tcp, ":9000")
            .with_host(HostConfig::tcp_upstream("a", "10.0.0.1:22"))
            .with_host(disabled(HostConfig::tcp_upstream("b", "10.0.0.2:22")))
            .with_host(HostConfig::tcp_upstream("c", "10.0.0.3:22"));
        assert_eq!(upstream_set(&server), vec!["10.0.0.1:22", "10.0.0.3:22"]);
    }

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:443"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn request_host_prefers_header() {
        let req = Request::builder()
            .uri("http://authority.test/x")
            .header("host", "header.test:81")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), "header.test:81");

        let req = Request::builder()
            .uri("http://authority.test/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), "authority.test");
    }
}
