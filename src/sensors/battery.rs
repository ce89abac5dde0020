//! Battery and charger sensors backed by the kernel power supply class.

use super::definition::{SensorDefinition, UpdateType};
use super::manager::{NO_ATTRIBUTES, SensorContext, SensorManager};
use crate::error::SensorError;
use async_trait::async_trait;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display};

pub const BATTERY_LEVEL: SensorDefinition =
    SensorDefinition::new("battery_level", "Battery Level", "mdi:battery")
        .device_class("battery")
        .unit("%")
        .state_class("measurement")
        .enabled_by_default();

pub const BATTERY_STATE: SensorDefinition =
    SensorDefinition::new("battery_state", "Battery State", "mdi:battery-charging")
        .device_class("enum")
        .enabled_by_default();

pub const IS_CHARGING: SensorDefinition =
    SensorDefinition::new("is_charging", "Is Charging", "mdi:power-plug")
        .binary()
        .device_class("plug")
        .enabled_by_default();

pub const CHARGER_TYPE: SensorDefinition =
    SensorDefinition::new("charger_type", "Charger Type", "mdi:power-plug")
        .device_class("enum")
        .enabled_by_default();

pub const BATTERY_HEALTH: SensorDefinition =
    SensorDefinition::new("battery_health", "Battery Health", "mdi:battery-heart-variant")
        .entity_category("diagnostic")
        .enabled_by_default();

pub const BATTERY_TEMPERATURE: SensorDefinition =
    SensorDefinition::new("battery_temperature", "Battery Temperature", "mdi:battery")
        .device_class("temperature")
        .unit("°C")
        .state_class("measurement")
        .entity_category("diagnostic")
        .update_type(UpdateType::Worker);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChargingStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    Unknown,
}

impl ChargingStatus {
    fn from_sysfs(value: &str) -> Self {
        match value.trim() {
            "Charging" => Self::Charging,
            "Discharging" => Self::Discharging,
            "Full" => Self::Full,
            "Not charging" => Self::NotCharging,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChargerType {
    None,
    Ac,
    Usb,
    Wireless,
}

/// One reading of the device battery.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySnapshot {
    pub level: Option<u8>,
    pub status: ChargingStatus,
    pub charger: ChargerType,
    pub health: Option<String>,
    pub temperature_c: Option<f64>,
}

impl BatterySnapshot {
    pub fn is_charging(&self) -> bool {
        matches!(self.status, ChargingStatus::Charging | ChargingStatus::Full)
            || self.charger != ChargerType::None
    }

    /// mdi icon for the level, in steps of ten.
    pub fn level_icon(&self) -> String {
        let Some(level) = self.level else {
            return "mdi:battery-unknown".to_string();
        };
        let charging = self.is_charging();
        match (level / 10) * 10 {
            100.. if charging => "mdi:battery-charging-100".to_string(),
            100.. => "mdi:battery".to_string(),
            0 if charging => "mdi:battery-charging-outline".to_string(),
            0 => "mdi:battery-outline".to_string(),
            step if charging => format!("mdi:battery-charging-{step}"),
            step => format!("mdi:battery-{step}"),
        }
    }

    fn state_icon(&self) -> &'static str {
        match self.status {
            ChargingStatus::Charging => "mdi:battery-plus",
            ChargingStatus::Discharging => "mdi:battery-minus",
            ChargingStatus::Full => "mdi:battery-charging",
            ChargingStatus::NotCharging => "mdi:battery",
            ChargingStatus::Unknown => "mdi:battery-unknown",
        }
    }

    fn charger_icon(&self) -> &'static str {
        match self.charger {
            ChargerType::Ac => "mdi:power-plug",
            ChargerType::Usb => "mdi:usb-port",
            ChargerType::Wireless => "mdi:battery-charging-wireless",
            ChargerType::None => "mdi:battery",
        }
    }
}

/// Source of battery readings.
pub trait PowerSupply: Send + Sync {
    /// `Ok(None)` when the device has no battery.
    fn read(&self) -> io::Result<Option<BatterySnapshot>>;
}

/// Reads `/sys/class/power_supply/*`.
pub struct SysfsPowerSupply {
    root: PathBuf,
}

impl SysfsPowerSupply {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PowerSupply for SysfsPowerSupply {
    fn read(&self) -> io::Result<Option<BatterySnapshot>> {
        let mut battery = None;
        let mut charger = ChargerType::None;

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for dir in entries {
            let kind = read_attr(&dir, "type").unwrap_or_default();
            let online = read_attr(&dir, "online").as_deref() == Some("1");
            match kind.as_str() {
                "Battery" if battery.is_none() => battery = Some(dir),
                "Mains" if online => charger = ChargerType::Ac,
                "USB" if online && charger == ChargerType::None => charger = ChargerType::Usb,
                "Wireless" if online && charger == ChargerType::None => {
                    charger = ChargerType::Wireless
                }
                _ => {}
            }
        }

        let Some(dir) = battery else {
            return Ok(None);
        };

        Ok(Some(BatterySnapshot {
            level: read_attr(&dir, "capacity").and_then(|v| v.parse::<u8>().ok()),
            status: read_attr(&dir, "status")
                .map(|s| ChargingStatus::from_sysfs(&s))
                .unwrap_or(ChargingStatus::Unknown),
            charger,
            health: read_attr(&dir, "health").map(|h| h.to_lowercase().replace(' ', "_")),
            // tenths of a degree Celsius
            temperature_c: read_attr(&dir, "temp")
                .and_then(|t| t.parse::<f64>().ok())
                .map(|t| t / 10.0),
        }))
    }
}

pub struct BatterySensorManager {
    supply: std::sync::Arc<dyn PowerSupply>,
}

impl BatterySensorManager {
    pub fn new(supply: std::sync::Arc<dyn PowerSupply>) -> Self {
        Self { supply }
    }

    fn snapshot(&self) -> Option<BatterySnapshot> {
        match self.supply.read() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("[Battery] Power supply unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl SensorManager for BatterySensorManager {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn available_sensors(&self, _ctx: &SensorContext) -> Vec<SensorDefinition> {
        vec![
            BATTERY_LEVEL,
            BATTERY_STATE,
            IS_CHARGING,
            CHARGER_TYPE,
            BATTERY_HEALTH,
            BATTERY_TEMPERATURE,
        ]
    }

    fn has_sensor(&self, _ctx: &SensorContext) -> bool {
        self.snapshot().is_some()
    }

    async fn request_sensor_update(&self, ctx: &SensorContext) -> Result<(), SensorError> {
        let Some(battery) = self.supply.read()? else {
            return Ok(());
        };

        if self.is_enabled(ctx, &BATTERY_LEVEL)?
            && let Some(level) = battery.level
        {
            ctx.on_sensor_updated(
                &BATTERY_LEVEL,
                level,
                &battery.level_icon(),
                NO_ATTRIBUTES,
                false,
            )?;
        }

        if self.is_enabled(ctx, &BATTERY_STATE)? {
            ctx.on_sensor_updated(
                &BATTERY_STATE,
                battery.status.as_ref(),
                battery.state_icon(),
                NO_ATTRIBUTES,
                false,
            )?;
        }

        if self.is_enabled(ctx, &IS_CHARGING)? {
            let charging = battery.is_charging();
            let icon = if charging {
                "mdi:power-plug"
            } else {
                "mdi:power-plug-off"
            };
            ctx.on_sensor_updated(&IS_CHARGING, charging, icon, NO_ATTRIBUTES, false)?;
        }

        if self.is_enabled(ctx, &CHARGER_TYPE)? {
            ctx.on_sensor_updated(
                &CHARGER_TYPE,
                battery.charger.as_ref(),
                battery.charger_icon(),
                NO_ATTRIBUTES,
                false,
            )?;
        }

        if self.is_enabled(ctx, &BATTERY_HEALTH)? {
            let health = battery.health.as_deref().unwrap_or("unknown");
            ctx.on_sensor_updated(
                &BATTERY_HEALTH,
                health,
                BATTERY_HEALTH.icon,
                NO_ATTRIBUTES,
                false,
            )?;
        }

        if self.is_enabled(ctx, &BATTERY_TEMPERATURE)?
            && let Some(temp) = battery.temperature_c
        {
            ctx.on_sensor_updated(
                &BATTERY_TEMPERATURE,
                temp,
                BATTERY_TEMPERATURE.icon,
                NO_ATTRIBUTES,
                false,
            )?;
        }

        Ok(())
    }
}
