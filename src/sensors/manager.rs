//! The capability contract every sensor source implements, and the context
//! handed to it.

use super::definition::{SensorDefinition, SensorValue};
use crate::clock::Clock;
use crate::error::SensorError;
use crate::integration::ServerManager;
use crate::store::{AttributeRecord, SensorSetting, SensorStore, SettingType, StateUpdate};
use crate::sync::events::Trigger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Attribute list for sensors that report none.
pub const NO_ATTRIBUTES: [(&str, Value); 0] = [];

/// Decides whether an OS-level permission has been granted.
pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, permission: &str) -> bool;
}

/// Fixed set of granted permissions, taken from configuration.
#[derive(Debug, Default, Clone)]
pub struct GrantedPermissions {
    granted: HashSet<String>,
}

impl GrantedPermissions {
    pub fn new<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }
}

impl PermissionChecker for GrantedPermissions {
    fn is_granted(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}

/// Shared services handed to sensor managers.
#[derive(Clone)]
pub struct SensorContext {
    store: Arc<dyn SensorStore>,
    servers: Arc<ServerManager>,
    permissions: Arc<dyn PermissionChecker>,
    clock: Arc<dyn Clock>,
}

impl SensorContext {
    pub fn new(
        store: Arc<dyn SensorStore>,
        servers: Arc<ServerManager>,
        permissions: Arc<dyn PermissionChecker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            servers,
            permissions,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SensorStore> {
        &self.store
    }

    pub fn servers(&self) -> &Arc<ServerManager> {
        &self.servers
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Permissions from `required` that have not been granted.
    pub fn missing_permissions(&self, required: &[&'static str]) -> Vec<&'static str> {
        required
            .iter()
            .copied()
            .filter(|p| !self.permissions.is_granted(p))
            .collect()
    }

    /// Whether the sensor is enabled on any server.
    ///
    /// Rows that do not exist yet are created here, enabled only when the
    /// sensor is enabled by default and its permissions are granted.
    pub fn is_enabled(
        &self,
        definition: &SensorDefinition,
        permissions_granted: bool,
    ) -> Result<bool, SensorError> {
        let default_enabled = permissions_granted && definition.enabled_by_default;
        let mut any = false;
        for server_id in self.servers.ids() {
            let record = self
                .store
                .get_or_default(definition.id, server_id, default_enabled)?;
            any |= record.enabled;
        }
        Ok(any)
    }

    /// Store a new value for a sensor on every server it has a row for.
    ///
    /// This never talks to a server; the reconciliation pass pushes changes.
    /// `force_update` clears the state watermark so an unchanged value is
    /// sent again.
    pub fn on_sensor_updated<K, A>(
        &self,
        definition: &SensorDefinition,
        value: impl Into<SensorValue>,
        icon: &str,
        attributes: A,
        force_update: bool,
    ) -> Result<(), SensorError>
    where
        K: Into<String>,
        A: IntoIterator<Item = (K, Value)>,
    {
        let value = value.into();
        let update = StateUpdate {
            state: value.to_state_string(),
            state_type: value.state_type(),
            icon: icon.to_string(),
            definition: *definition,
            force_resend: force_update,
        };
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| AttributeRecord {
                sensor_id: definition.id.to_string(),
                name: name.into(),
                value,
            })
            .collect();

        let touched = self.store.update_state(definition.id, &update, attributes)?;
        if touched == 0 {
            debug!("[Sensors] {} has no rows yet, value dropped", definition.id);
        }
        Ok(())
    }

    fn setting(
        &self,
        definition: &SensorDefinition,
        name: &str,
        value_type: SettingType,
        default: String,
        entries: Vec<String>,
    ) -> Result<SensorSetting, SensorError> {
        if let Some(existing) = self
            .store
            .get_settings(definition.id)
            .into_iter()
            .find(|s| s.name == name)
        {
            return Ok(existing);
        }
        let setting = SensorSetting {
            sensor_id: definition.id.to_string(),
            name: name.to_string(),
            value: default,
            value_type,
            enabled: true,
            entries,
        };
        self.store.upsert_setting(setting.clone())?;
        Ok(setting)
    }

    pub fn get_toggle_setting(
        &self,
        definition: &SensorDefinition,
        name: &str,
        default: bool,
    ) -> Result<bool, SensorError> {
        let setting = self.setting(
            definition,
            name,
            SettingType::Toggle,
            default.to_string(),
            Vec::new(),
        )?;
        Ok(setting.value.parse().unwrap_or(default))
    }

    pub fn get_number_setting(
        &self,
        definition: &SensorDefinition,
        name: &str,
        default: i64,
    ) -> Result<i64, SensorError> {
        let setting = self.setting(
            definition,
            name,
            SettingType::Number,
            default.to_string(),
            Vec::new(),
        )?;
        Ok(setting.value.trim().parse().unwrap_or(default))
    }

    /// A list setting falls back to `default` when the stored value is not
    /// one of `entries`.
    pub fn get_list_setting(
        &self,
        definition: &SensorDefinition,
        name: &str,
        entries: &[&str],
        default: &str,
    ) -> Result<String, SensorError> {
        let setting = self.setting(
            definition,
            name,
            SettingType::List,
            default.to_string(),
            entries.iter().map(|e| e.to_string()).collect(),
        )?;
        if entries.contains(&setting.value.as_str()) {
            Ok(setting.value)
        } else {
            Ok(default.to_string())
        }
    }
}

/// A source of one or more sensors.
#[async_trait]
pub trait SensorManager: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Sensors this manager can provide on this device.
    fn available_sensors(&self, ctx: &SensorContext) -> Vec<SensorDefinition>;

    /// Hardware or feature presence.
    fn has_sensor(&self, _ctx: &SensorContext) -> bool {
        true
    }

    fn required_permissions(&self, _sensor_id: &str) -> Vec<&'static str> {
        Vec::new()
    }

    fn check_permission(&self, ctx: &SensorContext, sensor_id: &str) -> bool {
        ctx.missing_permissions(&self.required_permissions(sensor_id))
            .is_empty()
    }

    /// Whether the sensor is enabled on any server; creates missing rows.
    fn is_enabled(
        &self,
        ctx: &SensorContext,
        definition: &SensorDefinition,
    ) -> Result<bool, SensorError> {
        ctx.is_enabled(definition, self.check_permission(ctx, definition.id))
    }

    fn owns(&self, ctx: &SensorContext, sensor_id: &str) -> bool {
        self.available_sensors(ctx)
            .iter()
            .any(|s| s.id == sensor_id)
    }

    /// Compute current values and write them with
    /// [`SensorContext::on_sensor_updated`].
    async fn request_sensor_update(&self, ctx: &SensorContext) -> Result<(), SensorError>;

    /// Same as [`request_sensor_update`](Self::request_sensor_update), with
    /// the trigger that caused the pass.
    async fn request_sensor_update_for(
        &self,
        ctx: &SensorContext,
        _trigger: &Trigger,
    ) -> Result<(), SensorError> {
        self.request_sensor_update(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonSensorStore;
    use crate::test_support::{FakeIntegration, FixedClock};
    use crate::integration::Server;
    use serde_json::json;

    const LEVEL: SensorDefinition =
        SensorDefinition::new("battery_level", "Battery Level", "mdi:battery").enabled_by_default();
    const HEALTH: SensorDefinition =
        SensorDefinition::new("battery_health", "Battery Health", "mdi:battery-heart");

    fn context(server_ids: &[u32], granted: &[&str]) -> SensorContext {
        let servers = server_ids
            .iter()
            .map(|id| {
                Arc::new(Server::new(
                    *id,
                    format!("server-{id}"),
                    Arc::new(FakeIntegration::new("2023.4.1")),
                ))
            })
            .collect();
        SensorContext::new(
            Arc::new(JsonSensorStore::in_memory()),
            Arc::new(ServerManager::new(servers)),
            Arc::new(GrantedPermissions::new(granted.iter().copied())),
            Arc::new(FixedClock::at("2024-03-01T12:00:00Z")),
        )
    }

    #[test]
    fn test_is_enabled_creates_rows_per_server() {
        let ctx = context(&[1, 2], &[]);
        assert!(ctx.is_enabled(&LEVEL, true).unwrap());
        assert!(!ctx.is_enabled(&HEALTH, true).unwrap());

        assert_eq!(ctx.store().get("battery_level").len(), 2);
        assert!(ctx.store().get_for_server("battery_health", 2).is_some());
    }

    #[test]
    fn test_is_enabled_default_requires_permission() {
        let ctx = context(&[1], &[]);
        assert!(!ctx.is_enabled(&LEVEL, false).unwrap());
        assert!(!ctx.store().get_for_server("battery_level", 1).unwrap().enabled);
    }

    #[test]
    fn test_on_sensor_updated_writes_state_and_attributes() {
        let ctx = context(&[1], &[]);
        ctx.is_enabled(&LEVEL, true).unwrap();

        ctx.on_sensor_updated(&LEVEL, 72u8, "mdi:battery-70", [("voltage", json!(3.9))], false)
            .unwrap();

        let full = ctx.store().get_full("battery_level", 1).unwrap();
        assert_eq!(full.sensor.state, "72");
        assert_eq!(full.sensor.icon, "mdi:battery-70");
        assert_eq!(full.sensor.name, "Battery Level");
        assert_eq!(full.attributes.len(), 1);
    }

    #[test]
    fn test_missing_permissions() {
        let ctx = context(&[1], &["a"]);
        assert_eq!(ctx.missing_permissions(&["a", "b"]), vec!["b"]);
        assert!(ctx.missing_permissions(&["a"]).is_empty());
    }

    #[test]
    fn test_settings_are_created_with_defaults() {
        let ctx = context(&[1], &[]);
        assert_eq!(ctx.get_number_setting(&HEALTH, "deadband", 60).unwrap(), 60);
        assert!(ctx.get_toggle_setting(&HEALTH, "verbose", true).unwrap());
        assert_eq!(
            ctx.get_list_setting(&HEALTH, "unit", &["c", "f"], "c").unwrap(),
            "c"
        );
        assert_eq!(ctx.store().get_settings("battery_health").len(), 3);

        // a stored value wins over the default
        let mut setting = ctx.store().get_settings("battery_health")[0].clone();
        setting.value = "120".into();
        ctx.store().upsert_setting(setting).unwrap();
        assert_eq!(ctx.get_number_setting(&HEALTH, "deadband", 60).unwrap(), 120);
    }
}
