//! Lifecycle of one server: bind, serve, drain.
//!
//! # Responsibilities
//! - Assign stable ids on first start
//! - Validate, build the routing table, load TLS, bind, then spawn the accept task
//! - Stop accepting and wait for the accept task so the port is released
//!
//! # Design Decisions
//! - `start` returns only after the socket is bound; later errors are logged
//! - HTTP drains in-flight requests for the grace period, TCP leaves relays alone
//! - A stopped or failed server can be started again from its config

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum_server::Handle;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::loader::join_errors;
use crate::config::schema::{Protocol, ServerConfig};
use crate::config::validation::{validate_server, ValidationError};
use crate::http::server::{build_router, RoutingContext};
use crate::lifecycle::engine::Engine;
use crate::net::connection::RelayLedger;
use crate::net::listener::{self, ListenerError};
use crate::net::relay::TcpRelay;
use crate::net::tls::{self, CertificateError};
use crate::routing::{upstream_set, HostTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server '{server}': {}", join_errors(.errors))]
    Invalid {
        server: String,
        errors: Vec<ValidationError>,
    },

    #[error("server '{server}': {source}")]
    Bind {
        server: String,
        #[source]
        source: ListenerError,
    },

    #[error("{source}, server: {server}")]
    Certificate {
        server: String,
        #[source]
        source: CertificateError,
    },
}

/// Runtime view of a server, as reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub protocol: Protocol,
    pub listen: String,
    pub disabled: bool,
    pub state: ServerState,
    pub local_addr: Option<String>,
    pub last_error: Option<String>,
    pub active_connections: Option<u64>,
}

enum Stopper {
    Http(Handle),
    Tcp {
        accepting: Arc<AtomicBool>,
        stop: watch::Sender<bool>,
    },
}

struct Running {
    local_addr: SocketAddr,
    stopper: Stopper,
    task: JoinHandle<()>,
}

/// One entry of the fleet.
pub struct Server {
    config: ServerConfig,
    state: ServerState,
    last_error: Option<String>,
    relays: RelayLedger,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let relays = RelayLedger::new(&config.name);
        Self {
            config,
            state: ServerState::Created,
            last_error: None,
            relays,
            running: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            protocol: self.config.protocol,
            listen: self.config.listen.clone(),
            disabled: self.config.disabled,
            state: self.state,
            local_addr: self.local_addr().map(|a| a.to_string()),
            last_error: self.last_error.clone(),
            active_connections: (self.config.protocol == Protocol::Tcp)
                .then(|| self.relays.live()),
        }
    }

    /// Bind the listener and spawn the accept task.
    pub async fn start(&mut self, engine: &Engine) -> Result<(), ServerError> {
        assign_ids(&mut self.config);

        if self.config.disabled {
            tracing::info!(server = %self.config.name, "Server disabled, not starting");
            self.state = ServerState::Stopped;
            return Ok(());
        }
        if self.running.is_some() {
            return Ok(());
        }

        self.state = ServerState::Starting;
        let result = match self.config.protocol {
            Protocol::Http | Protocol::Https => self.start_http(engine).await,
            Protocol::Tcp => self.start_tcp(engine).await,
        };

        match result {
            Ok(running) => {
                tracing::info!(
                    server = %self.config.name,
                    protocol = %self.config.protocol,
                    address = %running.local_addr,
                    "Listening"
                );
                self.running = Some(running);
                self.state = ServerState::Running;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::error!(server = %self.config.name, error = %e, "Server failed to start");
                self.state = ServerState::Failed;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn start_http(&self, engine: &Engine) -> Result<Running, ServerError> {
        let name = self.config.name.clone();
        validate_server(&self.config).map_err(|errors| ServerError::Invalid {
            server: name.clone(),
            errors,
        })?;

        let table = HostTable::build(&self.config.hosts);
        let tls = match self.config.protocol {
            Protocol::Https => Some(tls::server_config(&self.config.hosts).map_err(|source| {
                ServerError::Certificate { server: name.clone(), source }
            })?),
            _ => None,
        };

        let (listener, local_addr) = self.bind().await?;
        let listener = listener
            .into_std()
            .map_err(|source| self.bind_error(local_addr.to_string(), source))?;

        let ctx = Arc::new(RoutingContext::new(name.clone(), table, engine.client().clone()));
        let app = build_router(ctx).into_make_service();
        let handle = Handle::new();

        let task = match tls {
            Some(config) => {
                let server = axum_server::from_tcp_rustls(listener, config).handle(handle.clone());
                tokio::spawn(async move {
                    if let Err(e) = server.serve(app).await {
                        tracing::error!(server = %name, error = %e, "HTTPS listener failed");
                    }
                })
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(async move {
                    if let Err(e) = server.serve(app).await {
                        tracing::error!(server = %name, error = %e, "HTTP listener failed");
                    }
                })
            }
        };

        Ok(Running {
            local_addr,
            stopper: Stopper::Http(handle),
            task,
        })
    }

    async fn start_tcp(&self, engine: &Engine) -> Result<Running, ServerError> {
        validate_server(&self.config).map_err(|errors| ServerError::Invalid {
            server: self.config.name.clone(),
            errors,
        })?;

        let upstreams = upstream_set(&self.config);
        if upstreams.is_empty() {
            tracing::warn!(server = %self.config.name, "TCP server has no upstreams");
        }

        let (listener, local_addr) = self.bind().await?;
        let settings = engine.settings();
        let relay = Arc::new(TcpRelay::new(
            self.config.name.clone(),
            upstreams,
            settings.connect_timeout,
            settings.relay_buffer_size,
            self.relays.clone(),
        ));

        let accepting = Arc::new(AtomicBool::new(true));
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(relay.serve(listener, Arc::clone(&accepting), stop_rx));

        Ok(Running {
            local_addr,
            stopper: Stopper::Tcp { accepting, stop },
            task,
        })
    }

    async fn bind(&self) -> Result<(tokio::net::TcpListener, SocketAddr), ServerError> {
        listener::bind(&self.config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                server: self.config.name.clone(),
                source,
            })
    }

    fn bind_error(&self, address: String, source: std::io::Error) -> ServerError {
        ServerError::Bind {
            server: self.config.name.clone(),
            source: ListenerError::Bind { address, source },
        }
    }

    /// Stop accepting and wait for the accept task to finish.
    ///
    /// No-op for a server that never bound.
    pub async fn shutdown(&mut self, engine: &Engine) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = ServerState::Stopping;
        tracing::info!(server = %self.config.name, address = %running.local_addr, "Shutting down");

        match &running.stopper {
            Stopper::Http(handle) => {
                handle.graceful_shutdown(Some(engine.settings().shutdown_grace));
            }
            Stopper::Tcp { accepting, stop } => {
                accepting.store(false, Ordering::SeqCst);
                let _ = stop.send(true);
            }
        }

        if let Err(e) = running.task.await {
            tracing::error!(server = %self.config.name, error = %e, "Accept task ended abnormally");
        }

        self.state = ServerState::Stopped;
        tracing::info!(server = %self.config.name, "Server stopped");
    }
}

/// 32 lowercase hex characters.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn assign_ids(config: &mut ServerConfig) {
    if config.id.is_empty() {
        config.id = new_id();
    }
    for host in &mut config.hosts {
        if host.id.is_empty() {
            host.id = new_id();
        }
    }
}

/// Carry ids over from the definition being replaced.
///
/// Hosts are matched by name.
pub fn inherit_ids(config: &mut ServerConfig, previous: &ServerConfig) {
    if config.id.is_empty() {
        config.id = previous.id.clone();
    }
    for host in &mut config.hosts {
        if !host.id.is_empty() {
            continue;
        }
        if let Some(old) = previous.hosts.iter().find(|h| h.name == host.name) {
            host.id = old.id.clone();
        }
    }
}
