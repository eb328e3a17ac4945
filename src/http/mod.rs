//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP/HTTPS connection (axum-server)
//!     → server.rs (middleware, host lookup)
//!     → static_files.rs | redirect.rs | proxy.rs (host behaviour)
//!     → response.rs (JSON error bodies)
//!     → Send to client
//! ```

pub mod proxy;
pub mod redirect;
pub mod response;
pub mod server;
pub mod static_files;

pub use proxy::{build_client, UpstreamClient, UpstreamError};
pub use server::{build_router, RoutingContext};
