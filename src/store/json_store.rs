//! JSON-file backed sensor store.
//!
//! Holds all rows in memory behind a lock and rewrites the file after
//! every mutation. Without a path it is a plain in-memory store.

use super::SensorStore;
use super::models::{
    AttributeRecord, FullSensor, RegistrationState, SensorRecord, SensorSetting, StateUpdate,
};
use crate::error::Result;
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    sensors: Vec<SensorRecord>,
    #[serde(default)]
    attributes: Vec<AttributeRecord>,
    #[serde(default)]
    settings: Vec<SensorSetting>,
}

impl StoreData {
    fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<StoreData>(&bytes) {
                Ok(data) => {
                    info!(
                        "[Store] Loaded {} sensor rows from {:?}",
                        data.sensors.len(),
                        path
                    );
                    data
                }
                Err(e) => {
                    warn!("[Store] Failed to parse {:?}, starting empty: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Store] No sensor store at {:?} (first run)", path);
                Self::default()
            }
            Err(e) => {
                error!("[Store] Failed to read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn find(&self, sensor_id: &str, server_id: u32) -> Option<&SensorRecord> {
        self.sensors
            .iter()
            .find(|s| s.sensor_id == sensor_id && s.server_id == server_id)
    }

    fn find_mut(&mut self, sensor_id: &str, server_id: u32) -> Option<&mut SensorRecord> {
        self.sensors
            .iter_mut()
            .find(|s| s.sensor_id == sensor_id && s.server_id == server_id)
    }

    fn upsert(&mut self, record: SensorRecord) {
        match self.find_mut(&record.sensor_id, record.server_id) {
            Some(existing) => *existing = record,
            None => self.sensors.push(record),
        }
    }
}

pub struct JsonSensorStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl JsonSensorStore {
    /// Open (or create on first write) the store file at `path`.
    pub fn open(path: PathBuf) -> Self {
        let data = StoreData::load(&path);
        Self {
            path: Some(path),
            data: RwLock::new(data),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    /// Apply `f` under the write lock and persist before releasing it.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        let mut data = self.data.write();
        let out = f(&mut data);
        if let Some(path) = &self.path {
            data.save(path)?;
        }
        Ok(out)
    }
}

impl SensorStore for JsonSensorStore {
    fn get(&self, sensor_id: &str) -> Vec<SensorRecord> {
        self.data
            .read()
            .sensors
            .iter()
            .filter(|s| s.sensor_id == sensor_id)
            .cloned()
            .collect()
    }

    fn get_for_server(&self, sensor_id: &str, server_id: u32) -> Option<SensorRecord> {
        self.data.read().find(sensor_id, server_id).cloned()
    }

    fn get_full(&self, sensor_id: &str, server_id: u32) -> Option<FullSensor> {
        let data = self.data.read();
        let sensor = data.find(sensor_id, server_id)?.clone();
        let attributes = data
            .attributes
            .iter()
            .filter(|a| a.sensor_id == sensor_id)
            .cloned()
            .collect();
        Some(FullSensor { sensor, attributes })
    }

    fn get_all(&self) -> Vec<SensorRecord> {
        self.data.read().sensors.clone()
    }

    fn get_or_default(
        &self,
        sensor_id: &str,
        server_id: u32,
        enabled: bool,
    ) -> Result<SensorRecord> {
        if let Some(existing) = self.get_for_server(sensor_id, server_id) {
            return Ok(existing);
        }
        self.mutate(|data| {
            // re-check under the write lock
            if let Some(existing) = data.find(sensor_id, server_id) {
                return existing.clone();
            }
            let record = SensorRecord::new(sensor_id, server_id, enabled);
            data.sensors.push(record.clone());
            record
        })
    }

    fn upsert(&self, record: SensorRecord) -> Result<()> {
        self.mutate(|data| data.upsert(record))
    }

    fn update_state(
        &self,
        sensor_id: &str,
        update: &StateUpdate,
        attributes: Vec<AttributeRecord>,
    ) -> Result<usize> {
        self.mutate(|data| {
            let mut touched = 0;
            for record in data.sensors.iter_mut().filter(|s| s.sensor_id == sensor_id) {
                update.apply(record);
                touched += 1;
            }
            data.attributes.retain(|a| a.sensor_id != sensor_id);
            data.attributes.extend(attributes);
            touched
        })
    }

    fn mark_registered(
        &self,
        sensor_id: &str,
        server_id: u32,
        registration: RegistrationState,
        app_version: &str,
        core_version: &str,
    ) -> Result<()> {
        self.mutate(|data| {
            if let Some(record) = data.find_mut(sensor_id, server_id) {
                record.registration = registration;
                record.app_registration = Some(app_version.to_string());
                record.core_registration = Some(core_version.to_string());
            }
        })
    }

    fn set_enabled_and_registration(
        &self,
        sensor_id: &str,
        server_id: u32,
        enabled: bool,
        registration: RegistrationState,
    ) -> Result<()> {
        self.mutate(|data| {
            if let Some(record) = data.find_mut(sensor_id, server_id) {
                record.enabled = enabled;
                record.registration = registration;
            }
        })
    }

    fn update_last_sent(
        &self,
        sensor_id: &str,
        server_id: u32,
        state: Option<String>,
        icon: Option<String>,
    ) -> Result<()> {
        self.mutate(|data| {
            if let Some(record) = data.find_mut(sensor_id, server_id) {
                record.last_sent_state = state;
                record.last_sent_icon = icon;
            }
        })
    }

    fn reset_registration(&self, sensor_id: &str, server_id: u32) -> Result<()> {
        self.mutate(|data| {
            if let Some(record) = data.find_mut(sensor_id, server_id) {
                record.reset_registration();
            }
        })
    }

    fn set_enabled(&self, sensor_id: &str, server_id: u32, enabled: bool) -> Result<bool> {
        self.mutate(|data| match data.find_mut(sensor_id, server_id) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        })
    }

    fn enabled_count(&self, server_id: Option<u32>) -> usize {
        self.data
            .read()
            .sensors
            .iter()
            .filter(|s| s.enabled && server_id.is_none_or(|id| s.server_id == id))
            .count()
    }

    fn remove_orphans(&self, server_ids: &[u32]) -> Result<usize> {
        let orphaned = self
            .data
            .read()
            .sensors
            .iter()
            .any(|s| !server_ids.contains(&s.server_id));
        if !orphaned {
            return Ok(0);
        }
        self.mutate(|data| {
            let before = data.sensors.len();
            data.sensors.retain(|s| server_ids.contains(&s.server_id));
            before - data.sensors.len()
        })
    }

    fn get_settings(&self, sensor_id: &str) -> Vec<SensorSetting> {
        self.data
            .read()
            .settings
            .iter()
            .filter(|s| s.sensor_id == sensor_id)
            .cloned()
            .collect()
    }

    fn upsert_setting(&self, setting: SensorSetting) -> Result<()> {
        self.mutate(|data| {
            match data
                .settings
                .iter_mut()
                .find(|s| s.sensor_id == setting.sensor_id && s.name == setting.name)
            {
                Some(existing) => *existing = setting,
                None => data.settings.push(setting),
            }
        })
    }
}
