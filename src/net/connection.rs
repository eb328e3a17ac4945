//! Per-server accounting of relayed TCP connections.
//!
//! A `RelayLedger` belongs to a `Server`, not to its listener, so relays that
//! keep running after a shutdown are still counted until their sockets close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// How an accepted connection ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Both sockets were connected and bytes were copied.
    Relayed,
    /// The server had no upstream to dial.
    NoUpstream,
    /// The upstream refused, or the dial timed out.
    DialFailed,
}

impl RelayOutcome {
    /// Label used for the `outcome` tag of `hostgate_tcp_connections_total`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Relayed => "relayed",
            RelayOutcome::NoUpstream => "no_upstream",
            RelayOutcome::DialFailed => "dial_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayLedger {
    server: Arc<str>,
    live: Arc<AtomicU64>,
}

impl RelayLedger {
    pub fn new(server: &str) -> Self {
        Self {
            server: Arc::from(server),
            live: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count an accepted connection as live until the returned entry drops.
    pub fn open(&self, peer: SocketAddr) -> RelayEntry {
        self.live.fetch_add(1, Ordering::SeqCst);
        RelayEntry {
            ledger: self.clone(),
            peer,
            outcome: None,
        }
    }

    /// Connections accepted and not yet closed.
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }
}

/// One accepted connection, live while held.
#[derive(Debug)]
pub struct RelayEntry {
    ledger: RelayLedger,
    peer: SocketAddr,
    outcome: Option<RelayOutcome>,
}

impl RelayEntry {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Record the outcome once it is known. Only the first call counts.
    pub fn settle(&mut self, outcome: RelayOutcome) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(outcome);
        metrics::record_tcp_connection(&self.ledger.server, outcome);
    }

    pub fn outcome(&self) -> Option<RelayOutcome> {
        self.outcome
    }
}

impl Drop for RelayEntry {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(
            server = %self.ledger.server,
            peer = %self.peer,
            outcome = self.outcome.map(|o| o.as_str()).unwrap_or("unsettled"),
            "Connection closed"
        );
    }
}
