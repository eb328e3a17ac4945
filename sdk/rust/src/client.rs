//! Typed client for the hostgate admin API.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an `{"err": ...}` body.
    #[error("admin API returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl AdminError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AdminError::Api { status, .. } => Some(*status),
            AdminError::Http(e) => e.status(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AdminError::Api { message, .. } => message.clone(),
            AdminError::Http(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    err: String,
}

/// Runtime status of one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub protocol: String,
    pub listen: String,
    pub disabled: bool,
    pub state: String,
    pub local_addr: Option<String>,
    pub last_error: Option<String>,
    pub active_connections: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub servers: Vec<ServerStatus>,
}

pub struct AdminClient {
    client: Client,
    base_url: String,
    token: String,
}

impl AdminClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Current server definitions, as JSON objects.
    pub async fn list_servers(&self) -> Result<Vec<Value>, AdminError> {
        self.call(self.client.get(self.url("/api/servers"))).await
    }

    /// Replace the whole fleet. Rolled back by the server on failure.
    pub async fn replace_servers<T: Serialize + ?Sized>(&self, servers: &T) -> Result<(), AdminError> {
        let _: Value = self
            .call(self.client.patch(self.url("/api/servers")).json(servers))
            .await?;
        Ok(())
    }

    /// Add or replace one server by name.
    pub async fn upsert_server<T: Serialize + ?Sized>(&self, server: &T) -> Result<(), AdminError> {
        let _: Value = self
            .call(self.client.post(self.url("/api/server")).json(server))
            .await?;
        Ok(())
    }

    /// Write a fleet to the server's config file without applying it.
    pub async fn save_servers<T: Serialize + ?Sized>(&self, servers: &T) -> Result<(), AdminError> {
        let _: Value = self
            .call(self.client.post(self.url("/api/servers")).json(servers))
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<SystemStatus, AdminError> {
        self.call(self.client.get(self.url("/api/status"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AdminError> {
        let resp = request.header("Authorization", &self.token).send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.err)
                .unwrap_or(text);
            return Err(AdminError::Api { status, message });
        }

        serde_json::from_str(&text).map_err(|e| AdminError::Api {
            status,
            message: format!("invalid response body: {}", e),
        })
    }
}
