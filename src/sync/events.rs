//! Triggers that start a sensor update pass.

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// System broadcast that may change sensor values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum SystemEvent {
    TimeTick,
    BatteryChanged,
    BatteryLow,
    BatteryOkay,
    PowerConnected,
    PowerDisconnected,
    ConnectivityChanged,
    ScreenOn,
    ScreenOff,
    BootCompleted,
}

impl SystemEvent {
    /// Charging values take a moment to settle after these; the
    /// dispatcher runs a second pass for them.
    pub fn is_battery_transition(self) -> bool {
        matches!(
            self,
            Self::BatteryLow | Self::BatteryOkay | Self::PowerConnected | Self::PowerDisconnected
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    UpdateAll,
    /// Refresh only the managers that own this sensor id
    UpdateSensor(String),
    Event(SystemEvent),
}

impl Trigger {
    pub fn event(&self) -> Option<SystemEvent> {
        match self {
            Self::Event(event) => Some(*event),
            _ => None,
        }
    }

    /// Name recorded by the `last_update` sensor.
    pub fn name(&self) -> String {
        match self {
            Self::UpdateAll => "update_sensors".to_string(),
            Self::UpdateSensor(_) => "update_sensor".to_string(),
            Self::Event(event) => event.to_string(),
        }
    }
}

impl From<SystemEvent> for Trigger {
    fn from(event: SystemEvent) -> Self {
        Self::Event(event)
    }
}
