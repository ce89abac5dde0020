//! Remote integration API of a home-automation server.
//!
//! The reconciliation engine only sees [`IntegrationClient`]; the
//! [`webhook::WebhookClient`] implements it over the mobile app webhook.

pub mod models;
pub mod server;
pub mod webhook;

pub use models::{CoreVersion, EntityStatus, RemoteConfig, SensorRegistration, ServerConfig};
pub use server::{Server, ServerManager};
pub use webhook::WebhookClient;

use crate::error::IntegrationError;
use async_trait::async_trait;

#[async_trait]
pub trait IntegrationClient: Send + Sync {
    /// Fetch the server's config, including per-entity disabled flags.
    async fn get_config(&self) -> Result<RemoteConfig, IntegrationError>;

    /// Whether server-side enable/disable changes may override local state.
    fn is_trusted(&self) -> bool;

    async fn register_sensor(
        &self,
        registration: &SensorRegistration,
    ) -> Result<(), IntegrationError>;

    /// Push new states for a batch of sensors. `Ok(false)` means the server
    /// answered but did not accept every sensor.
    async fn update_sensors(
        &self,
        batch: &[SensorRegistration],
    ) -> Result<bool, IntegrationError>;
}
