//! Upstream selection subsystem.
//!
//! # Data Flow
//! ```text
//! reverse proxy: Host header bytes   ─┐
//!                                     ├→ hash.rs (FNV-1a 32) → candidates[hash % len]
//! tcp relay:     peer address string ─┘
//! ```
//!
//! # Design Decisions
//! - Stateless: no counters, no health state, no connection awareness
//! - Deterministic: the same key always picks the same candidate for a fixed set

pub mod hash;

pub use hash::{fnv1a_32, select, select_index};
