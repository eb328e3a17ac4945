//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required fields per protocol and host behaviour
//! - Detect duplicate server names within one fleet
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function; certificate loading happens in `net::tls`
//! - Runs before any running server is touched

use std::collections::HashSet;

use url::Url;

use crate::config::schema::{HostKind, Protocol, ServerConfig};

/// A single semantic problem in a server definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name is required")]
    MissingServerName,

    #[error("server '{server}': listen address is required")]
    MissingListen { server: String },

    #[error("server '{server}': duplicate server name")]
    DuplicateServerName { server: String },

    #[error("server '{server}': host #{index} has no name")]
    MissingHostName { server: String, index: usize },

    #[error("server '{server}', host '{host}': type is required")]
    MissingHostKind { server: String, host: String },

    #[error("server '{server}', host '{host}': path is required for serve_static")]
    MissingPath { server: String, host: String },

    #[error("server '{server}', host '{host}': redirect_url is required for 301_redirect")]
    MissingRedirectTarget { server: String, host: String },

    #[error("server '{server}', host '{host}': forward_urls is required for reverse_proxy")]
    MissingForwardTargets { server: String, host: String },

    #[error("server '{server}', host '{host}': invalid forward url '{url}'")]
    InvalidForwardTarget { server: String, host: String, url: String },

    #[error("server '{server}', host '{host}': upstream is required for tcp")]
    MissingUpstream { server: String, host: String },

    #[error("server '{server}', host '{host}': cert_path and key_path are required for https")]
    MissingCertificate { server: String, host: String },
}

/// Validate a single server definition.
pub fn validate_server(server: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let name = server.name.clone();

    if server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if server.listen.trim().is_empty() {
        errors.push(ValidationError::MissingListen { server: name.clone() });
    }

    for (index, host) in server.hosts.iter().enumerate() {
        if server.protocol == Protocol::Tcp {
            if !host.disabled && host.upstream.trim().is_empty() {
                errors.push(ValidationError::MissingUpstream {
                    server: name.clone(),
                    host: host.name.clone(),
                });
            }
            continue;
        }

        if host.name.trim().is_empty() {
            errors.push(ValidationError::MissingHostName { server: name.clone(), index });
            continue;
        }
        if host.disabled {
            continue;
        }

        let owner = name.clone();
        let host_name = host.name.clone();
        match host.kind {
            None => errors.push(ValidationError::MissingHostKind { server: owner, host: host_name }),
            Some(HostKind::ServeStatic) if host.path.trim().is_empty() => {
                errors.push(ValidationError::MissingPath { server: owner, host: host_name })
            }
            Some(HostKind::Redirect) if host.redirect_url.trim().is_empty() => {
                errors.push(ValidationError::MissingRedirectTarget { server: owner, host: host_name })
            }
            Some(HostKind::ReverseProxy) if host.forward_urls.is_empty() => {
                errors.push(ValidationError::MissingForwardTargets { server: owner, host: host_name })
            }
            Some(HostKind::ReverseProxy) => {
                for url in &host.forward_urls {
                    if !is_upstream_url(url) {
                        errors.push(ValidationError::InvalidForwardTarget {
                            server: owner.clone(),
                            host: host_name.clone(),
                            url: url.clone(),
                        });
                    }
                }
            }
            Some(_) => {}
        }

        if server.protocol == Protocol::Https
            && (host.cert_path.trim().is_empty() || host.key_path.trim().is_empty())
        {
            errors.push(ValidationError::MissingCertificate {
                server: name.clone(),
                host: host.name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a whole fleet: every server, plus unique names.
pub fn validate_fleet(servers: &[ServerConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for server in servers {
        if let Err(mut server_errors) = validate_server(server) {
            errors.append(&mut server_errors);
        }
        if !server.name.is_empty() && !seen.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServerName { server: server.name.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_upstream_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
