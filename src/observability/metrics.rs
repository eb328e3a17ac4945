//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hostgate_requests_total` (counter): HTTP requests by server, host kind, status
//! - `hostgate_request_duration_seconds` (histogram): HTTP latency by server
//! - `hostgate_tcp_connections_total` (counter): TCP connections by server, outcome
//! - `hostgate_reconfigurations_total` (counter): fleet changes by operation, result

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::connection::RelayOutcome;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(server: &str, kind: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "hostgate_requests_total",
        "server" => server.to_string(),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("hostgate_request_duration_seconds", "server" => server.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_tcp_connection(server: &str, outcome: RelayOutcome) {
    metrics::counter!(
        "hostgate_tcp_connections_total",
        "server" => server.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Outcome of a fleet change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfiguration {
    Applied,
    /// A replacement failed and the previous servers were restarted.
    RolledBack,
    /// A new server failed to start; nothing else was touched.
    Failed,
}

impl Reconfiguration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconfiguration::Applied => "ok",
            Reconfiguration::RolledBack => "rolled_back",
            Reconfiguration::Failed => "failed",
        }
    }
}

pub fn record_reconfiguration(operation: &'static str, result: Reconfiguration) {
    let result = result.as_str();
    metrics::counter!(
        "hostgate_reconfigurations_total",
        "operation" => operation,
        "result" => result
    )
    .increment(1);
}
