//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server::start
//!     → listener.rs (bind, address normalization)
//!     → tls.rs (HTTPS only: per-host certificates, SNI selection)
//!     → HTTP layer, or
//!     → relay.rs (TCP only: upstream pick, bidirectional copy)
//!         → connection.rs (live relays, outcome tags)
//! ```
//!
//! # Design Decisions
//! - Binding happens before `start` returns, so port conflicts surface there
//! - Certificates load before the socket is bound
//! - Relayed connections outlive their listener

pub mod connection;
pub mod listener;
pub mod relay;
pub mod tls;

pub use connection::{RelayEntry, RelayLedger, RelayOutcome};
pub use listener::{bind, normalize_address, ListenerError};
pub use relay::TcpRelay;
pub use tls::{CertificateError, SniResolver};
