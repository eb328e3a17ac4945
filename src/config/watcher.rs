//! Fleet file watcher for hot reload.
//!
//! A write usually raises several modify events, and a save through the admin
//! API must not apply the fleet. Both are filtered by content: only file
//! contents that differ from the last reload and from the last admin save are
//! parsed and sent on.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{fingerprint, parse_fleet, SavedFleet};
use crate::config::schema::ServerConfig;

/// Decides which file contents are worth reloading.
#[derive(Debug)]
pub struct ReloadFilter {
    last_loaded: Option<u64>,
    saved: SavedFleet,
}

impl ReloadFilter {
    /// `current` is what the running fleet was loaded from, if anything.
    pub fn new(current: Option<&[u8]>, saved: SavedFleet) -> Self {
        Self {
            last_loaded: current.map(fingerprint),
            saved,
        }
    }

    /// True when `contents` should be parsed and applied.
    ///
    /// Admin saves are remembered as seen, so touching the file again later
    /// with the same bytes does not apply them either.
    pub fn admit(&mut self, contents: &[u8]) -> bool {
        let print = fingerprint(contents);
        if self.last_loaded == Some(print) {
            return false;
        }
        if self.saved.matches(contents) {
            tracing::debug!("Config file written by the admin API, not reloading");
            self.last_loaded = Some(print);
            return false;
        }
        true
    }

    /// Remember `contents` once they parsed into a fleet.
    pub fn loaded(&mut self, contents: &[u8]) {
        self.last_loaded = Some(fingerprint(contents));
    }
}

/// A watcher that monitors the fleet file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    saved: SavedFleet,
    update_tx: mpsc::UnboundedSender<Vec<ServerConfig>>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for parsed fleet updates.
    pub fn new(
        path: &Path,
        saved: SavedFleet,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<ServerConfig>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                saved,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let current = fs::read(&path).ok();
        let mut filter = ReloadFilter::new(current.as_deref(), self.saved.clone());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let contents = match fs::read(&path) {
                        Ok(contents) => contents,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Config file unreadable");
                            return;
                        }
                    };
                    if !filter.admit(&contents) {
                        return;
                    }

                    tracing::info!(path = %path.display(), "Config file change detected, reloading");
                    match parse_fleet(&contents) {
                        Ok(servers) => {
                            filter.loaded(&contents);
                            let _ = tx.send(servers);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current fleet");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::save_fleet;

    const ONE: &[u8] = br#"[{"name": "a", "type": "tcp", "listen": ":1"}]"#;
    const TWO: &[u8] = br#"[{"name": "b", "type": "tcp", "listen": ":2"}]"#;

    #[test]
    fn repeated_events_reload_once() {
        let mut filter = ReloadFilter::new(Some(ONE), SavedFleet::default());
        assert!(!filter.admit(ONE));

        assert!(filter.admit(TWO));
        filter.loaded(TWO);
        assert!(!filter.admit(TWO));
        assert!(filter.admit(ONE));
    }

    #[test]
    fn admin_saves_are_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostgate.json");
        let saved = SavedFleet::default();
        let mut filter = ReloadFilter::new(None, saved.clone());

        save_fleet(&path, TWO, &saved).unwrap();
        let written = fs::read(&path).unwrap();
        assert!(!filter.admit(&written));
        assert!(!filter.admit(&written));

        // A later hand edit is applied again.
        assert!(filter.admit(ONE));
    }

    #[tokio::test]
    async fn hand_edits_reach_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostgate.json");
        fs::write(&path, ONE).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path, SavedFleet::default());
        let _watcher = watcher.run().unwrap();
        fs::write(&path, TWO).unwrap();

        let servers = tokio::time::timeout(Duration::from_secs(10), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(servers[0].name, "b");
    }
}
