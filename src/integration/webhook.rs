//! Mobile app webhook client.
//!
//! Every call is a `POST {url}/api/webhook/{webhook_id}` with a JSON body
//! of the form `{"type": ..., "data": ...}`.

use super::IntegrationClient;
use super::models::{RemoteConfig, SensorRegistration};
use crate::config::ServerSettings;
use crate::error::IntegrationError;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

/// Fields sent for a state update (a subset of the registration).
#[derive(Debug, Serialize)]
struct SensorStateUpdate<'a> {
    unique_id: &'a str,
    #[serde(rename = "type")]
    sensor_type: &'a str,
    state: &'a Value,
    icon: &'a str,
    attributes: &'a serde_json::Map<String, Value>,
}

impl<'a> From<&'a SensorRegistration> for SensorStateUpdate<'a> {
    fn from(r: &'a SensorRegistration) -> Self {
        Self {
            unique_id: &r.unique_id,
            sensor_type: r.sensor_type.as_ref(),
            state: &r.state,
            icon: &r.icon,
            attributes: &r.attributes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UpdateResult {
    success: bool,
    #[serde(default)]
    error: Option<UpdateError>,
}

/// Interpret an `update_sensor_states` response. Returns false when any
/// sensor was not accepted.
pub fn parse_update_response(response: Value) -> Result<bool, IntegrationError> {
    let results: HashMap<String, UpdateResult> = serde_json::from_value(response)
        .map_err(|e| IntegrationError::Malformed(e.to_string()))?;

    let mut all_ok = true;
    for (id, result) in results {
        if !result.success {
            all_ok = false;
            match result.error {
                Some(e) => warn!("[Webhook] Sensor {} rejected: {} ({})", id, e.code, e.message),
                None => warn!("[Webhook] Sensor {} rejected", id),
            }
        }
    }
    Ok(all_ok)
}

/// Interpret a `register_sensor` response. The server answers with
/// `{"success": true}`; an empty body is accepted as well.
pub fn parse_register_response(response: Value) -> Result<(), IntegrationError> {
    match response.get("success").and_then(Value::as_bool) {
        Some(false) => Err(IntegrationError::Rejected(
            response
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("registration refused")
                .to_string(),
        )),
        _ => Ok(()),
    }
}

pub struct WebhookClient {
    client: reqwest::Client,
    webhook_url: String,
    trusted: bool,
}

impl WebhookClient {
    pub fn new(settings: &ServerSettings, timeout: Duration) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("companion-sensor-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url(&settings.url, &settings.webhook_id),
            trusted: settings.trusted,
        })
    }

    async fn call(&self, body: Value) -> Result<Value, IntegrationError> {
        debug!("[Webhook] POST {} {}", self.webhook_url, body["type"]);
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| IntegrationError::Malformed(e.to_string()))
    }
}

pub fn webhook_url(base: &str, webhook_id: &str) -> String {
    format!("{}/api/webhook/{}", base.trim_end_matches('/'), webhook_id)
}

#[async_trait]
impl IntegrationClient for WebhookClient {
    async fn get_config(&self) -> Result<RemoteConfig, IntegrationError> {
        let response = self.call(json!({ "type": "get_config" })).await?;
        serde_json::from_value(response).map_err(|e| IntegrationError::Malformed(e.to_string()))
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }

    async fn register_sensor(
        &self,
        registration: &SensorRegistration,
    ) -> Result<(), IntegrationError> {
        let response = self
            .call(json!({ "type": "register_sensor", "data": registration }))
            .await?;
        parse_register_response(response)
    }

    async fn update_sensors(
        &self,
        batch: &[SensorRegistration],
    ) -> Result<bool, IntegrationError> {
        let data: Vec<SensorStateUpdate<'_>> = batch.iter().map(Into::into).collect();
        let response = self
            .call(json!({ "type": "update_sensor_states", "data": data }))
            .await?;
        parse_update_response(response)
    }
}
