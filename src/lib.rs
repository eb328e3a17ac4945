//! hostgate: a multi-protocol edge server.
//!
//! One process terminates HTTP, HTTPS and raw TCP for a fleet of servers.
//! Each server routes by host name to a static directory, a redirect or a
//! reverse proxy, or relays TCP to hashed upstreams. The fleet can be
//! replaced or amended at runtime through the admin API, all-or-nothing.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Traffic management
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::schema::{EngineSettings, HostConfig, HostKind, Protocol, ServerConfig};
pub use lifecycle::{Engine, Fleet, FleetError, Server, ServerState, Shutdown};
