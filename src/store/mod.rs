//! Local sensor store.
//!
//! Sensor rows are keyed by `(sensor_id, server_id)`. Attributes and
//! settings are keyed by sensor id. Every mutating call is atomic with
//! respect to other calls on the same store.

pub mod json_store;
pub mod models;

pub use json_store::JsonSensorStore;
pub use models::{
    AttributeRecord, FullSensor, RegistrationState, SensorRecord, SensorSetting, SettingType,
    StateUpdate,
};

use crate::error::Result;

pub trait SensorStore: Send + Sync {
    /// Rows for a sensor across all servers.
    fn get(&self, sensor_id: &str) -> Vec<SensorRecord>;

    fn get_for_server(&self, sensor_id: &str, server_id: u32) -> Option<SensorRecord>;

    fn get_full(&self, sensor_id: &str, server_id: u32) -> Option<FullSensor>;

    fn get_all(&self) -> Vec<SensorRecord>;

    /// Return the row, inserting it with `enabled` if it does not exist yet.
    fn get_or_default(&self, sensor_id: &str, server_id: u32, enabled: bool)
    -> Result<SensorRecord>;

    /// Insert or replace a row.
    fn upsert(&self, record: SensorRecord) -> Result<()>;

    /// Write a freshly computed state to every row of the sensor and replace
    /// all of its attributes. Returns the number of rows touched.
    fn update_state(
        &self,
        sensor_id: &str,
        update: &StateUpdate,
        attributes: Vec<AttributeRecord>,
    ) -> Result<usize>;

    /// Record a successful registration and stamp the versions it was made with.
    fn mark_registered(
        &self,
        sensor_id: &str,
        server_id: u32,
        registration: RegistrationState,
        app_version: &str,
        core_version: &str,
    ) -> Result<()>;

    /// Adopt an enabled state decided by the server.
    fn set_enabled_and_registration(
        &self,
        sensor_id: &str,
        server_id: u32,
        enabled: bool,
        registration: RegistrationState,
    ) -> Result<()>;

    fn update_last_sent(
        &self,
        sensor_id: &str,
        server_id: u32,
        state: Option<String>,
        icon: Option<String>,
    ) -> Result<()>;

    fn reset_registration(&self, sensor_id: &str, server_id: u32) -> Result<()>;

    /// Returns false when no such row exists.
    fn set_enabled(&self, sensor_id: &str, server_id: u32, enabled: bool) -> Result<bool>;

    /// Enabled rows, optionally limited to one server.
    fn enabled_count(&self, server_id: Option<u32>) -> usize;

    /// Delete rows whose server is not in `server_ids`. Returns how many went.
    fn remove_orphans(&self, server_ids: &[u32]) -> Result<usize>;

    fn get_settings(&self, sensor_id: &str) -> Vec<SensorSetting>;

    fn upsert_setting(&self, setting: SensorSetting) -> Result<()>;
}
