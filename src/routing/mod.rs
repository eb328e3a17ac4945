//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Server start:
//!     hosts[] → table.rs (skip disabled, last name wins) → Arc<HostTable>
//!
//! Incoming request:
//!     Host header / authority → strip port → HostTable::resolve
//!     → Ok(host) dispatched to its behaviour
//!     → Err(RouteMiss) answered with 400
//! ```
//!
//! # Design Decisions
//! - Tables are rebuilt wholesale on every start, read-only afterwards
//! - O(1) host lookup via HashMap
//! - Explicit miss (not found vs disabled) rather than a silent default

pub mod table;

pub use table::{request_host, strip_port, upstream_set, HostTable, RouteMiss};
