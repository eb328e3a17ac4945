//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Boot:
//!     Load config → Validate → Fleet::start_all → Server::start (each, in order)
//!
//! Reconfiguration (admin API, config watcher):
//!     Validate → lock fleet → shutdown old → start new → commit or roll back
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Fleet::shutdown_all → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup, any boot error is fatal
//! - Shutdown has timeout: HTTP drains for the grace period only
//! - Servers are plain structs owned by the fleet; no server outlives its entry

pub mod engine;
pub mod fleet;
pub mod server;
pub mod shutdown;
pub mod signals;

pub use engine::Engine;
pub use fleet::{Fleet, FleetError};
pub use server::{Server, ServerError, ServerState, ServerStatus};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
