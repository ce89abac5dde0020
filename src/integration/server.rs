//! Configured servers and their cached state.

use super::IntegrationClient;
use super::models::{CoreVersion, ServerConfig};
use super::webhook::WebhookClient;
use crate::config::ServerSettings;
use crate::error::{IntegrationError, Result};
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    pub id: u32,
    pub name: String,
    client: Arc<dyn IntegrationClient>,
    /// Version seen on the last successful config fetch
    version: RwLock<Option<CoreVersion>>,
}

impl Server {
    pub fn new(id: u32, name: impl Into<String>, client: Arc<dyn IntegrationClient>) -> Self {
        Self {
            id,
            name: name.into(),
            client,
            version: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &dyn IntegrationClient {
        self.client.as_ref()
    }

    pub fn version(&self) -> Option<CoreVersion> {
        *self.version.read()
    }

    pub fn set_version(&self, version: CoreVersion) {
        *self.version.write() = Some(version);
    }

    /// Fetch config and trust flag for a reconciliation pass and remember
    /// the server version.
    pub async fn fetch_config(&self) -> std::result::Result<ServerConfig, IntegrationError> {
        let remote = self.client.get_config().await?;
        let version = CoreVersion::parse(&remote.version).ok_or_else(|| {
            IntegrationError::Malformed(format!("unparseable version {:?}", remote.version))
        })?;
        if self.version() != Some(version) {
            info!("[Server] {} reports version {}", self.name, version);
        }
        self.set_version(version);
        Ok(ServerConfig {
            version,
            entities: remote.entities,
            trusted: self.client.is_trusted(),
        })
    }
}

#[derive(Default)]
pub struct ServerManager {
    servers: Vec<Arc<Server>>,
}

impl ServerManager {
    pub fn new(servers: Vec<Arc<Server>>) -> Self {
        Self { servers }
    }

    /// Build webhook-backed servers from configuration.
    pub fn from_settings(settings: &[ServerSettings], timeout: Duration) -> Result<Self> {
        let servers = settings
            .iter()
            .map(|s| {
                let client = WebhookClient::new(s, timeout)?;
                Ok(Arc::new(Server::new(s.id, s.name.clone(), Arc::new(client))))
            })
            .collect::<std::result::Result<Vec<_>, IntegrationError>>()?;
        Ok(Self { servers })
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    pub fn get(&self, id: u32) -> Option<&Arc<Server>> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.servers.iter().map(|s| s.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// True when any server is known to track disabled sensors.
    pub fn any_supports_disabled_sensors(&self) -> bool {
        self.servers
            .iter()
            .any(|s| s.version().is_some_and(|v| v.supports_disabled_sensors()))
    }
}
