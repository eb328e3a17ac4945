//! Admin control plane.
//!
//! # Responsibilities
//! - Expose the fleet over a token-protected JSON API
//! - Persist fleet definitions to the config file on request
//!
//! # Design Decisions
//! - Every mutation goes through `Fleet`, so the API inherits its rollback
//! - Bodies are parsed by hand so parse errors use the `{"err": ...}` shape
//! - Trailing-slash paths are aliases, matching what the console sends

pub mod auth;
pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use rand::Rng;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::loader::SavedFleet;
use crate::lifecycle::Fleet;

const TOKEN_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Clone)]
pub struct AdminState {
    pub fleet: Arc<Fleet>,
    pub config_path: Arc<PathBuf>,
    pub token: Arc<str>,
    /// Lets the config watcher skip files this API wrote.
    pub saved: SavedFleet,
}

impl AdminState {
    pub fn new(fleet: Arc<Fleet>, config_path: impl Into<PathBuf>, token: &str) -> Self {
        Self {
            fleet,
            config_path: Arc::new(config_path.into()),
            token: Arc::from(token),
            saved: SavedFleet::default(),
        }
    }

    /// Share save fingerprints with a config watcher.
    pub fn with_saved_fleet(mut self, saved: SavedFleet) -> Self {
        self.saved = saved;
        self
    }
}

/// Random port in `[50000, 60000)` on all interfaces.
pub fn default_listen() -> SocketAddr {
    let port = rand::thread_rng().gen_range(50000..60000);
    SocketAddr::from(([0u16; 8], port))
}

/// Random 32-character access token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/servers", get(list_servers).patch(replace_servers).post(save_servers))
        .route("/api/servers/", get(list_servers).patch(replace_servers).post(save_servers))
        .route("/api/server", post(upsert_server))
        .route("/api/server/", post(upsert_server))
        .route("/api/status", get(get_status))
        .route("/api/status/", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
