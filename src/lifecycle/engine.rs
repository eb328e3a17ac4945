//! Shared engine state handed to every server on start.

use crate::config::schema::EngineSettings;
use crate::http::proxy::{build_client, UpstreamClient, UpstreamError};

/// Settings plus the outbound client shared by all reverse-proxy hosts.
#[derive(Debug, Clone)]
pub struct Engine {
    settings: EngineSettings,
    client: UpstreamClient,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Result<Self, UpstreamError> {
        let client = build_client(settings.connect_timeout)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }
}
