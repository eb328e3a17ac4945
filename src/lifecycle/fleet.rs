//! Fleet orchestration.
//!
//! # Responsibilities
//! - Own the authoritative list of servers
//! - Full replace and single-server upsert, both all-or-nothing
//! - Boot and process-exit sequencing
//!
//! # Design Decisions
//! - One async mutex, held across the whole shutdown/start sequence
//! - Everything that can be checked without binding is checked before any
//!   running server is touched
//! - A failed reconfiguration restarts what was running before

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::loader::join_errors;
use crate::config::schema::{Protocol, ServerConfig};
use crate::config::validation::{validate_fleet, validate_server, ValidationError};
use crate::lifecycle::engine::Engine;
use crate::lifecycle::server::{inherit_ids, Server, ServerError, ServerStatus};
use crate::net::tls;
use crate::observability::metrics::{self, Reconfiguration};

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Rejected before any side effect.
    #[error("{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    /// Rejected before any side effect.
    #[error(transparent)]
    Rejected(ServerError),

    /// A server failed to start; nothing that was started is left running.
    #[error(transparent)]
    Start(ServerError),

    /// A replacement failed to start; the previous servers were restarted.
    #[error(transparent)]
    RolledBack(ServerError),
}

pub struct Fleet {
    engine: Arc<Engine>,
    servers: Mutex<Vec<Server>>,
}

impl Fleet {
    pub fn new(engine: Arc<Engine>, configs: Vec<ServerConfig>) -> Self {
        Self {
            engine,
            servers: Mutex::new(configs.into_iter().map(Server::new).collect()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start every server in order. On failure the ones already started are shut down.
    pub async fn start_all(&self) -> Result<(), FleetError> {
        let mut servers = self.servers.lock().await;
        for index in 0..servers.len() {
            if let Err(e) = servers[index].start(&self.engine).await {
                for started in servers.iter_mut().take(index) {
                    started.shutdown(&self.engine).await;
                }
                return Err(FleetError::Start(e));
            }
        }
        tracing::info!(servers = servers.len(), "Fleet started");
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let mut servers = self.servers.lock().await;
        for server in servers.iter_mut() {
            server.shutdown(&self.engine).await;
        }
        tracing::info!("Fleet stopped");
    }

    /// Current definitions, in fleet order.
    pub async fn snapshot(&self) -> Vec<ServerConfig> {
        let servers = self.servers.lock().await;
        servers.iter().map(|s| s.config().clone()).collect()
    }

    pub async fn statuses(&self) -> Vec<ServerStatus> {
        let servers = self.servers.lock().await;
        servers.iter().map(Server::status).collect()
    }

    /// Replace the whole fleet.
    pub async fn replace_all(&self, configs: Vec<ServerConfig>) -> Result<(), FleetError> {
        validate_fleet(&configs).map_err(FleetError::Invalid)?;
        for config in &configs {
            preflight(config)?;
        }

        let mut servers = self.servers.lock().await;
        let mut incoming: Vec<Server> = configs
            .into_iter()
            .map(|mut config| {
                if let Some(previous) = servers.iter().find(|s| s.name() == config.name) {
                    inherit_ids(&mut config, previous.config());
                }
                Server::new(config)
            })
            .collect();

        for server in servers.iter_mut() {
            server.shutdown(&self.engine).await;
        }

        for index in 0..incoming.len() {
            if let Err(e) = incoming[index].start(&self.engine).await {
                tracing::warn!(server = %incoming[index].name(), error = %e, "Replacement failed, rolling back");
                for started in incoming.iter_mut().take(index) {
                    started.shutdown(&self.engine).await;
                }
                for previous in servers.iter_mut() {
                    if let Err(restart) = previous.start(&self.engine).await {
                        tracing::error!(server = %previous.name(), error = %restart, "Rollback restart failed");
                    }
                }
                metrics::record_reconfiguration("replace", Reconfiguration::RolledBack);
                return Err(FleetError::RolledBack(e));
            }
        }

        *servers = incoming;
        metrics::record_reconfiguration("replace", Reconfiguration::Applied);
        tracing::info!(servers = servers.len(), "Fleet replaced");
        Ok(())
    }

    /// Add a server, or replace the one with the same name in place.
    pub async fn upsert(&self, config: ServerConfig) -> Result<(), FleetError> {
        validate_server(&config).map_err(FleetError::Invalid)?;
        preflight(&config)?;

        let mut servers = self.servers.lock().await;
        let Some(index) = servers.iter().position(|s| s.name() == config.name) else {
            let mut server = Server::new(config);
            server.start(&self.engine).await.map_err(|e| {
                metrics::record_reconfiguration("upsert", Reconfiguration::Failed);
                FleetError::Start(e)
            })?;
            tracing::info!(server = %server.name(), "Server added");
            servers.push(server);
            metrics::record_reconfiguration("upsert", Reconfiguration::Applied);
            return Ok(());
        };

        let mut config = config;
        inherit_ids(&mut config, servers[index].config());
        let mut replacement = Server::new(config);

        servers[index].shutdown(&self.engine).await;
        if let Err(e) = replacement.start(&self.engine).await {
            let previous = &mut servers[index];
            if let Err(restart) = previous.start(&self.engine).await {
                tracing::error!(server = %previous.name(), error = %restart, "Rollback restart failed");
            }
            metrics::record_reconfiguration("upsert", Reconfiguration::RolledBack);
            return Err(FleetError::RolledBack(e));
        }

        servers[index] = replacement;
        metrics::record_reconfiguration("upsert", Reconfiguration::Applied);
        tracing::info!(server = %servers[index].name(), "Server replaced");
        Ok(())
    }
}

/// Load HTTPS key material without binding anything.
fn preflight(config: &ServerConfig) -> Result<(), FleetError> {
    if config.disabled || config.protocol != Protocol::Https {
        return Ok(());
    }
    tls::check_hosts(&config.hosts).map_err(|source| {
        FleetError::Rejected(ServerError::Certificate {
            server: config.name.clone(),
            source,
        })
    })
}
