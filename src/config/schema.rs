//! Configuration schema definitions.
//!
//! This module defines the fleet file structure (servers and their hosts) and
//! the engine settings shared by every running server. Fleet types derive
//! Serde traits; the JSON keys follow the admin console's wire format.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize};

/// Listener protocol of a server. Fixed for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a host does with a matched HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum HostKind {
    #[serde(rename = "serve_static")]
    ServeStatic,
    #[serde(rename = "301_redirect", alias = "redirect")]
    Redirect,
    #[serde(rename = "reverse_proxy")]
    ReverseProxy,
}

impl HostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKind::ServeStatic => "serve_static",
            HostKind::Redirect => "301_redirect",
            HostKind::ReverseProxy => "reverse_proxy",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serve_static" => Ok(HostKind::ServeStatic),
            "301_redirect" | "redirect" => Ok(HostKind::Redirect),
            "reverse_proxy" => Ok(HostKind::ReverseProxy),
            other => Err(format!("unknown host type '{}'", other)),
        }
    }
}

/// One server of the fleet: a listener plus its hosts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Stable identity, generated on first start when empty.
    #[serde(default)]
    pub id: String,

    /// Unique name within the fleet, used to match reconfigurations.
    #[serde(default)]
    pub name: String,

    /// Disabled servers stay in the fleet but are never bound.
    #[serde(default)]
    pub disabled: bool,

    #[serde(rename = "type", alias = "protocol")]
    pub protocol: Protocol,

    /// Listen address (e.g. "0.0.0.0:8080" or ":8080").
    #[serde(default)]
    pub listen: String,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, protocol: Protocol, listen: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            disabled: false,
            protocol,
            listen: listen.into(),
            hosts: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: HostConfig) -> Self {
        self.hosts.push(host);
        self
    }

    /// Hosts that take part in routing.
    pub fn enabled_hosts(&self) -> impl Iterator<Item = &HostConfig> {
        self.hosts.iter().filter(|h| !h.disabled)
    }
}

/// A virtual host (HTTP/HTTPS) or upstream target (TCP) owned by a server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub id: String,

    pub name: String,

    /// Behaviour for HTTP/HTTPS servers. Ignored by TCP servers.
    #[serde(rename = "type", deserialize_with = "deserialize_kind")]
    pub kind: Option<HostKind>,

    /// Document root for `serve_static`.
    pub path: String,

    /// Target prefix for `301_redirect`.
    #[serde(alias = "redirect_target")]
    pub redirect_url: String,

    /// Upstream base URLs for `reverse_proxy`.
    #[serde(alias = "forward_targets", deserialize_with = "deserialize_targets")]
    pub forward_urls: Vec<String>,

    /// Upstream address for TCP servers.
    pub upstream: String,

    pub cert_path: String,

    pub key_path: String,

    pub disable_dir_listing: bool,

    pub disabled: bool,

    /// Value for `Access-Control-Allow-Origin` on this host's responses.
    pub allowed_origin: String,
}

impl HostConfig {
    pub fn serve_static(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(HostKind::ServeStatic),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn redirect(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(HostKind::Redirect),
            redirect_url: target.into(),
            ..Default::default()
        }
    }

    pub fn reverse_proxy<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: Some(HostKind::ReverseProxy),
            forward_urls: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn tcp_upstream(name: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: upstream.into(),
            ..Default::default()
        }
    }
}

// The admin console sends "" for TCP hosts, which has no behaviour.
fn deserialize_kind<'de, D>(deserializer: D) -> Result<Option<HostKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(kind) => kind.parse().map(Some).map_err(de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetList {
    Text(String),
    List(Vec<String>),
}

fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let targets = match Option::<TargetList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TargetList::Text(text)) => text.split_whitespace().map(str::to_string).collect(),
        Some(TargetList::List(list)) => list
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    };
    Ok(targets)
}

/// Settings shared by every server of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long a graceful HTTP shutdown waits for in-flight requests.
    pub shutdown_grace: Duration,

    /// Timeout for dialing reverse-proxy and TCP upstreams.
    pub connect_timeout: Duration,

    /// Size of each TCP relay buffer.
    pub relay_buffer_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            relay_buffer_size: 4096,
        }
    }
}
