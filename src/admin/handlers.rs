use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::loader::save_fleet;
use crate::config::schema::ServerConfig;
use crate::http::response::{json_error, json_ok};
use crate::lifecycle::ServerStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub servers: Vec<ServerStatus>,
}

/// `GET /api/servers`
pub async fn list_servers(State(state): State<AdminState>) -> Json<Vec<ServerConfig>> {
    Json(state.fleet.snapshot().await)
}

/// `PATCH /api/servers`: replace the whole fleet.
pub async fn replace_servers(State(state): State<AdminState>, body: Bytes) -> Response {
    let configs: Vec<ServerConfig> = match serde_json::from_slice(&body) {
        Ok(configs) => configs,
        Err(e) => return bad_request(e),
    };

    match state.fleet.replace_all(configs).await {
        Ok(()) => json_ok(),
        Err(e) => bad_request(e),
    }
}

/// `POST /api/servers`: persist the body to the config file without applying it.
pub async fn save_servers(State(state): State<AdminState>, body: Bytes) -> Response {
    match save_fleet(&state.config_path, &body, &state.saved) {
        Ok(()) => json_ok(),
        Err(e) => bad_request(e),
    }
}

/// `POST /api/server`: add or replace one server by name.
pub async fn upsert_server(State(state): State<AdminState>, body: Bytes) -> Response {
    let config: ServerConfig = match serde_json::from_slice(&body) {
        Ok(config) => config,
        Err(e) => return bad_request(e),
    };

    match state.fleet.upsert(config).await {
        Ok(()) => json_ok(),
        Err(e) => bad_request(e),
    }
}

/// `GET /api/status`
pub async fn get_status(State(state): State<AdminState>) -> impl IntoResponse {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        servers: state.fleet.statuses().await,
    })
}

fn bad_request(err: impl std::fmt::Display) -> Response {
    tracing::warn!(error = %err, "Admin request rejected");
    json_error(StatusCode::BAD_REQUEST, err)
}
