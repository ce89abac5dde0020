use crate::sensors::definition::{SensorDefinition, SensorType};
use crate::store::FullSensor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Server release version, e.g. `2023.4.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreVersion {
    pub year: u32,
    pub month: u32,
    pub patch: u32,
}

impl CoreVersion {
    /// First release that reports per-entity disabled flags in its config.
    pub const DISABLED_SENSORS: CoreVersion = CoreVersion::new(2022, 6, 0);

    pub const fn new(year: u32, month: u32, patch: u32) -> Self {
        Self { year, month, patch }
    }

    /// Parse the leading numeric parts of a version string. Pre-release and
    /// dev suffixes (`2024.1.0b3`, `2023.12.0.dev0`) are ignored.
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.trim().split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });
        let year = parts.next()??;
        let month = parts.next()??;
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(year, month, patch))
    }

    pub fn is_at_least(&self, year: u32, month: u32, patch: u32) -> bool {
        *self >= Self::new(year, month, patch)
    }

    pub fn supports_disabled_sensors(&self) -> bool {
        *self >= Self::DISABLED_SENSORS
    }
}

impl fmt::Display for CoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.patch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityStatus {
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// `get_config` response as sent by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub version: String,
    #[serde(default)]
    pub entities: HashMap<String, EntityStatus>,
}

/// Server state for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub version: CoreVersion,
    pub entities: HashMap<String, EntityStatus>,
    pub trusted: bool,
}

impl ServerConfig {
    pub fn supports_disabled_sensors(&self) -> bool {
        self.version.supports_disabled_sensors()
    }

    /// Enabled state per sensor id, for entities that report a disabled flag.
    pub fn core_sensor_status(&self) -> HashMap<String, bool> {
        self.entities
            .iter()
            .filter_map(|(id, status)| status.disabled.map(|d| (id.clone(), !d)))
            .collect()
    }
}

/// Registration and state payload for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRegistration {
    pub unique_id: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub name: String,
    pub state: Value,
    pub icon: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    /// Only sent to servers that track disabled sensors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl SensorRegistration {
    pub fn new(full: &FullSensor, definition: &SensorDefinition, include_disabled: bool) -> Self {
        let sensor = &full.sensor;
        let icon = if sensor.icon.is_empty() {
            definition.icon.to_string()
        } else {
            sensor.icon.clone()
        };
        Self {
            unique_id: definition.id.to_string(),
            sensor_type: definition.sensor_type,
            name: definition.name.to_string(),
            state: sensor.typed_state(),
            icon,
            attributes: full
                .attributes
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            device_class: definition.device_class.map(String::from),
            unit_of_measurement: definition.unit_of_measurement.map(String::from),
            state_class: definition.state_class.map(String::from),
            entity_category: definition.entity_category.map(String::from),
            disabled: include_disabled.then_some(!sensor.enabled),
        }
    }
}
