//! Static sensor definitions and the values managers report for them.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Entity domain a sensor is registered under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorType {
    #[default]
    Sensor,
    BinarySensor,
}

/// What drives a sensor's value updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UpdateType {
    /// System events plus the periodic worker
    Intent,
    /// System events only
    IntentOnly,
    /// Periodic worker only
    Worker,
    Location,
    Custom,
}

/// Compile-time description of one sensor a manager can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDefinition {
    pub id: &'static str,
    pub sensor_type: SensorType,
    pub name: &'static str,
    /// Stateless mdi icon, used until the manager computes a state icon
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    pub unit_of_measurement: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub entity_category: Option<&'static str>,
    pub enabled_by_default: bool,
    pub update_type: UpdateType,
}

impl SensorDefinition {
    /// A plain `sensor` with no metadata, driven by system events.
    pub const fn new(id: &'static str, name: &'static str, icon: &'static str) -> Self {
        Self {
            id,
            sensor_type: SensorType::Sensor,
            name,
            icon,
            device_class: None,
            unit_of_measurement: None,
            state_class: None,
            entity_category: None,
            enabled_by_default: false,
            update_type: UpdateType::Intent,
        }
    }

    pub const fn binary(mut self) -> Self {
        self.sensor_type = SensorType::BinarySensor;
        self
    }

    pub const fn device_class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    pub const fn unit(mut self, unit: &'static str) -> Self {
        self.unit_of_measurement = Some(unit);
        self
    }

    pub const fn state_class(mut self, state_class: &'static str) -> Self {
        self.state_class = Some(state_class);
        self
    }

    pub const fn entity_category(mut self, category: &'static str) -> Self {
        self.entity_category = Some(category);
        self
    }

    pub const fn enabled_by_default(mut self) -> Self {
        self.enabled_by_default = true;
        self
    }

    pub const fn update_type(mut self, update_type: UpdateType) -> Self {
        self.update_type = update_type;
        self
    }
}

/// Stored representation of a sensor state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateType {
    Boolean,
    Int,
    Float,
    #[default]
    String,
}

/// A freshly computed sensor state.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SensorValue {
    pub fn state_type(&self) -> StateType {
        match self {
            Self::Bool(_) => StateType::Boolean,
            Self::Int(_) => StateType::Int,
            Self::Float(_) => StateType::Float,
            Self::Text(_) => StateType::String,
        }
    }

    /// String form written to the store and compared against the watermark.
    pub fn to_state_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SensorValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u8> for SensorValue {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for SensorValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for SensorValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SensorValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Convert a stored state back into its typed JSON form for the wire.
pub fn typed_state(state: &str, state_type: StateType) -> serde_json::Value {
    use serde_json::Value;
    match state_type {
        StateType::Boolean => state
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(state.to_string())),
        StateType::Int => state
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(state.to_string())),
        StateType::Float => state
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(state.to_string())),
        StateType::String => Value::String(state.to_string()),
    }
}
