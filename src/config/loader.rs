//! Fleet file loading and persisting.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_fleet, ValidationError};
use crate::load_balancer::hash::fnv1a_32;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate a fleet from raw JSON bytes.
pub fn parse_fleet(bytes: &[u8]) -> Result<Vec<ServerConfig>, ConfigError> {
    let servers: Vec<ServerConfig> = serde_json::from_slice(bytes)?;
    validate_fleet(&servers).map_err(ConfigError::Validation)?;
    Ok(servers)
}

/// Load and validate a fleet from a JSON file.
pub fn load_fleet(path: &Path) -> Result<Vec<ServerConfig>, ConfigError> {
    let bytes = fs::read(path)?;
    parse_fleet(&bytes)
}

/// Re-indent a JSON document with two spaces, keeping key order.
pub fn reindent(body: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    Ok(serde_json::to_vec_pretty(&value)?)
}

/// Write a JSON document to the fleet file without applying it.
///
/// The written contents are recorded in `saved` before the file is touched,
/// so a watcher on the same file can tell the save apart from an edit.
pub fn save_fleet(path: &Path, body: &[u8], saved: &SavedFleet) -> Result<(), ConfigError> {
    let formatted = reindent(body)?;
    saved.record(&formatted);
    fs::write(path, formatted)?;
    tracing::info!(path = %path.display(), "Configuration saved");
    Ok(())
}

/// Length and FNV-1a hash of a fleet file's contents. Never zero.
pub fn fingerprint(contents: &[u8]) -> u64 {
    ((contents.len() as u64) << 32) | u64::from(fnv1a_32(contents))
}

/// Fingerprint of the last fleet file written through the admin API.
#[derive(Debug, Clone, Default)]
pub struct SavedFleet(Arc<AtomicU64>);

impl SavedFleet {
    pub fn record(&self, contents: &[u8]) {
        self.0.store(fingerprint(contents), Ordering::SeqCst);
    }

    pub fn matches(&self, contents: &[u8]) -> bool {
        self.0.load(Ordering::SeqCst) == fingerprint(contents)
    }
}
