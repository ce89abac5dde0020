//! Fakes shared by the unit tests.

use crate::clock::Clock;
use crate::error::{IntegrationError, SensorError};
use crate::integration::{
    EntityStatus, IntegrationClient, RemoteConfig, SensorRegistration, Server, ServerManager,
};
use crate::notifier::{Notifier, PermissionNotice};
use crate::sensors::battery::{BatterySnapshot, PowerSupply};
use crate::sensors::last_reboot::UptimeSource;
use crate::sensors::manager::NO_ATTRIBUTES;
use crate::sensors::{GrantedPermissions, SensorContext, SensorDefinition, SensorManager};
use crate::store::JsonSensorStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const DEFAULT_NOW: &str = "2024-03-01T12:00:00Z";

/// How the fake answers `update_sensor_states`.
#[derive(Clone, Copy)]
pub enum UpdateOutcome {
    Accept,
    Reject,
    Fail(fn() -> IntegrationError),
}

/// Integration client that records every call.
pub struct FakeIntegration {
    version: String,
    trusted: bool,
    entities: HashMap<String, EntityStatus>,
    config_error: Option<fn() -> IntegrationError>,
    register_error: Mutex<Option<fn() -> IntegrationError>>,
    update_outcome: Mutex<UpdateOutcome>,
    update_delay: Option<Duration>,
    config_calls: AtomicUsize,
    registrations: Mutex<Vec<SensorRegistration>>,
    updates: Mutex<Vec<Vec<SensorRegistration>>>,
}

impl FakeIntegration {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            trusted: false,
            entities: HashMap::new(),
            config_error: None,
            register_error: Mutex::new(None),
            update_outcome: Mutex::new(UpdateOutcome::Accept),
            update_delay: None,
            config_calls: AtomicUsize::new(0),
            registrations: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    /// Report `sensor_id` with the given disabled flag.
    pub fn with_entity(mut self, sensor_id: &str, disabled: Option<bool>) -> Self {
        self.entities
            .insert(sensor_id.to_string(), EntityStatus { disabled });
        self
    }

    pub fn failing_config(mut self, error: fn() -> IntegrationError) -> Self {
        self.config_error = Some(error);
        self
    }

    pub fn slow_updates(mut self, delay: Duration) -> Self {
        self.update_delay = Some(delay);
        self
    }

    pub fn fail_register(&self, error: Option<fn() -> IntegrationError>) {
        *self.register_error.lock() = error;
    }

    pub fn set_update_outcome(&self, outcome: UpdateOutcome) {
        *self.update_outcome.lock() = outcome;
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<SensorRegistration> {
        self.registrations.lock().clone()
    }

    pub fn update_batches(&self) -> Vec<Vec<SensorRegistration>> {
        self.updates.lock().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.registrations.lock().len() + self.updates.lock().len()
    }
}

#[async_trait]
impl IntegrationClient for FakeIntegration {
    async fn get_config(&self) -> Result<RemoteConfig, IntegrationError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.config_error {
            return Err(error());
        }
        Ok(RemoteConfig {
            version: self.version.clone(),
            entities: self.entities.clone(),
        })
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }

    async fn register_sensor(
        &self,
        registration: &SensorRegistration,
    ) -> Result<(), IntegrationError> {
        self.registrations.lock().push(registration.clone());
        match *self.register_error.lock() {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn update_sensors(
        &self,
        batch: &[SensorRegistration],
    ) -> Result<bool, IntegrationError> {
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        self.updates.lock().push(batch.to_vec());
        let outcome = *self.update_outcome.lock();
        match outcome {
            UpdateOutcome::Accept => Ok(true),
            UpdateOutcome::Reject => Ok(false),
            UpdateOutcome::Fail(error) => Err(error()),
        }
    }
}

/// Manager over arbitrary definitions that writes one fixed value.
pub struct FakeManager {
    name: &'static str,
    definitions: Vec<SensorDefinition>,
    value: Mutex<String>,
    permissions: Vec<&'static str>,
    present: bool,
    failing: bool,
    calls: AtomicUsize,
}

impl FakeManager {
    pub fn new(name: &'static str, definitions: Vec<SensorDefinition>) -> Self {
        Self {
            name,
            definitions,
            value: Mutex::new("on".to_string()),
            permissions: Vec::new(),
            present: true,
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn requiring(mut self, permission: &'static str) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn set_value(&self, value: &str) {
        *self.value.lock() = value.to_string();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorManager for FakeManager {
    fn name(&self) -> &'static str {
        self.name
    }

    fn available_sensors(&self, _ctx: &SensorContext) -> Vec<SensorDefinition> {
        self.definitions.clone()
    }

    fn has_sensor(&self, _ctx: &SensorContext) -> bool {
        self.present
    }

    fn required_permissions(&self, _sensor_id: &str) -> Vec<&'static str> {
        self.permissions.clone()
    }

    async fn request_sensor_update(&self, ctx: &SensorContext) -> Result<(), SensorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(SensorError::Parse(format!("{} exploded", self.name)));
        }
        let value = self.value.lock().clone();
        for definition in &self.definitions {
            if self.is_enabled(ctx, definition)? {
                ctx.on_sensor_updated(
                    definition,
                    value.as_str(),
                    definition.icon,
                    NO_ATTRIBUTES,
                    false,
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<PermissionNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<PermissionNotice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_permission_missing(&self, notice: PermissionNotice) {
        self.notices.lock().push(notice);
    }
}

pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn at(rfc3339: &str) -> Self {
        Self(rfc3339.parse().expect("valid RFC 3339 timestamp"))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct StaticPowerSupply {
    snapshot: Mutex<Option<BatterySnapshot>>,
}

impl StaticPowerSupply {
    pub fn new(snapshot: Option<BatterySnapshot>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: Option<BatterySnapshot>) {
        *self.snapshot.lock() = snapshot;
    }
}

impl PowerSupply for StaticPowerSupply {
    fn read(&self) -> io::Result<Option<BatterySnapshot>> {
        Ok(self.snapshot.lock().clone())
    }
}

pub struct FixedUptime(pub Duration);

impl UptimeSource for FixedUptime {
    fn uptime(&self) -> io::Result<Duration> {
        Ok(self.0)
    }
}

pub fn server(id: u32, fake: Arc<FakeIntegration>) -> Arc<Server> {
    Arc::new(Server::new(id, format!("server-{id}"), fake))
}

/// Context over an in-memory store and the given servers.
pub fn context_with(servers: Vec<Arc<Server>>, granted: &[&str]) -> SensorContext {
    SensorContext::new(
        Arc::new(JsonSensorStore::in_memory()),
        Arc::new(ServerManager::new(servers)),
        Arc::new(GrantedPermissions::new(granted.iter().copied())),
        Arc::new(FixedClock::at(DEFAULT_NOW)),
    )
}

pub fn test_context(server_ids: &[u32]) -> SensorContext {
    test_context_at(server_ids, DEFAULT_NOW)
}

pub fn test_context_at(server_ids: &[u32], now: &str) -> SensorContext {
    let servers = server_ids
        .iter()
        .map(|id| server(*id, Arc::new(FakeIntegration::new("2023.4.1"))))
        .collect();
    SensorContext::new(
        Arc::new(JsonSensorStore::in_memory()),
        Arc::new(ServerManager::new(servers)),
        Arc::new(GrantedPermissions::default()),
        Arc::new(FixedClock::at(now)),
    )
}
