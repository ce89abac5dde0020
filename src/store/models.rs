//! Persisted rows of the local sensor store.

use crate::sensors::definition::{SensorDefinition, SensorType, StateType, typed_state};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What the server last accepted for a sensor.
///
/// `Unregistered` means the server has never accepted a registration (or
/// the last one must be redone). It is never the same as disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    #[default]
    Unregistered,
    RegisteredDisabled,
    RegisteredEnabled,
}

impl RegistrationState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::RegisteredEnabled
        } else {
            Self::RegisteredDisabled
        }
    }

    pub fn is_registered(self) -> bool {
        self != Self::Unregistered
    }

    /// True when registered with exactly this enabled value.
    pub fn matches(self, enabled: bool) -> bool {
        self.as_option() == Some(enabled)
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Unregistered => None,
            Self::RegisteredDisabled => Some(false),
            Self::RegisteredEnabled => Some(true),
        }
    }
}

/// One sensor on one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub sensor_id: String,
    pub server_id: u32,
    pub enabled: bool,
    #[serde(default)]
    pub registration: RegistrationState,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_type: StateType,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub last_sent_state: Option<String>,
    #[serde(default)]
    pub last_sent_icon: Option<String>,
    #[serde(default)]
    pub app_registration: Option<String>,
    #[serde(default)]
    pub core_registration: Option<String>,
    #[serde(default)]
    pub sensor_type: SensorType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub entity_category: Option<String>,
}

impl SensorRecord {
    pub fn new(sensor_id: impl Into<String>, server_id: u32, enabled: bool) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            server_id,
            enabled,
            registration: RegistrationState::Unregistered,
            state: String::new(),
            state_type: StateType::String,
            icon: String::new(),
            last_sent_state: None,
            last_sent_icon: None,
            app_registration: None,
            core_registration: None,
            sensor_type: SensorType::Sensor,
            name: String::new(),
            device_class: None,
            unit_of_measurement: None,
            state_class: None,
            entity_category: None,
        }
    }

    /// Copy presentation metadata from the definition.
    pub fn apply_definition(&mut self, definition: &SensorDefinition) {
        self.sensor_type = definition.sensor_type;
        self.name = definition.name.to_string();
        self.device_class = definition.device_class.map(String::from);
        self.unit_of_measurement = definition.unit_of_measurement.map(String::from);
        self.state_class = definition.state_class.map(String::from);
        self.entity_category = definition.entity_category.map(String::from);
    }

    /// Current (state, icon) differs from the last pushed pair.
    pub fn has_unsent_changes(&self) -> bool {
        self.last_sent_state.as_deref() != Some(self.state.as_str())
            || self.last_sent_icon.as_deref() != Some(self.icon.as_str())
    }

    pub fn typed_state(&self) -> serde_json::Value {
        typed_state(&self.state, self.state_type)
    }

    /// Forget the registration and the watermark so the next pass starts over.
    pub fn reset_registration(&mut self) {
        self.registration = RegistrationState::Unregistered;
        self.last_sent_state = None;
        self.last_sent_icon = None;
    }
}

/// A freshly computed value, applied to every row of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub state: String,
    pub state_type: StateType,
    pub icon: String,
    pub definition: SensorDefinition,
    /// Clear the state watermark so the next pass resends
    pub force_resend: bool,
}

impl StateUpdate {
    pub fn apply(&self, record: &mut SensorRecord) {
        record.state = self.state.clone();
        record.state_type = self.state_type;
        record.icon = self.icon.clone();
        record.apply_definition(&self.definition);
        if self.force_resend {
            record.last_sent_state = None;
        }
    }
}

/// Extra context for a sensor, shared by its rows on every server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub sensor_id: String,
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettingType {
    Toggle,
    Number,
    List,
    String,
}

/// A user-adjustable option of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSetting {
    pub sensor_id: String,
    pub name: String,
    pub value: String,
    pub value_type: SettingType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub entries: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A record joined with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct FullSensor {
    pub sensor: SensorRecord,
    pub attributes: Vec<AttributeRecord>,
}
