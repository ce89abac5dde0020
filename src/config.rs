use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};

const CONFIG_DIR: &str = "companion-sensor-sync";
const CONFIG_FILE: &str = "config.json";
const STORE_FILE: &str = "sensors.json";

/// Split `.env` content into key/value pairs.
///
/// Values may contain spaces without quoting; surrounding single or double
/// quotes are stripped.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Load `.env` from the working directory. Variables already present in
/// the environment win.
pub fn load_dotenv() {
    let Ok(content) = fs::read_to_string(".env") else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called from main before the tokio runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// How often the time tick is allowed to trigger a sensor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorUpdateFrequency {
    #[default]
    Normal,
    FastAlways,
    FastWhileCharging,
}

/// One configured home-automation server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub id: u32,
    pub name: String,
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub url: String,
    pub webhook_id: String,
    #[serde(default)]
    pub trusted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_version: String,
    pub store_path: PathBuf,
    pub update_frequency: SensorUpdateFrequency,
    pub worker_interval_secs: u64,
    pub tick_interval_secs: u64,
    pub power_poll_secs: u64,
    pub settle_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub power_supply_root: PathBuf,
    pub granted_permissions: Vec<String>,
    pub servers: Vec<ServerSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            store_path: config_dir().join(STORE_FILE),
            update_frequency: SensorUpdateFrequency::Normal,
            worker_interval_secs: 15 * 60,
            tick_interval_secs: 60,
            power_poll_secs: 10,
            settle_delay_ms: 5_000,
            request_timeout_secs: 30,
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
            granted_permissions: Vec::new(),
            servers: Vec::new(),
        }
    }
}

/// `~/.config/companion-sensor-sync`, falling back to the working directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

impl Config {
    /// Defaults, then the JSON file, then `SENSOR_SYNC_*` environment overrides.
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// `SENSOR_SYNC_SERVER_URL` together with `SENSOR_SYNC_WEBHOOK_ID`
    /// replaces (or adds) server 1, which covers single-server setups.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(version) = lookup("SENSOR_SYNC_APP_VERSION") {
            self.app_version = version;
        }
        if let Some(path) = lookup("SENSOR_SYNC_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(frequency) = lookup("SENSOR_SYNC_UPDATE_FREQUENCY")
            && let Ok(f) = frequency.parse()
        {
            self.update_frequency = f;
        }
        if let Some(secs) = lookup("SENSOR_SYNC_WORKER_INTERVAL")
            && let Ok(s) = secs.parse()
        {
            self.worker_interval_secs = s;
        }
        if let Some(root) = lookup("SENSOR_SYNC_POWER_SUPPLY_ROOT") {
            self.power_supply_root = PathBuf::from(root);
        }
        if let Some(perms) = lookup("SENSOR_SYNC_GRANTED_PERMISSIONS") {
            self.granted_permissions = perms
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let (Some(url), Some(webhook_id)) = (
            lookup("SENSOR_SYNC_SERVER_URL"),
            lookup("SENSOR_SYNC_WEBHOOK_ID"),
        ) {
            let trusted = lookup("SENSOR_SYNC_SERVER_TRUSTED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);
            self.servers.retain(|s| s.id != 1);
            self.servers.insert(
                0,
                ServerSettings {
                    id: 1,
                    name: lookup("SENSOR_SYNC_SERVER_NAME").unwrap_or_else(|| "Home".to_string()),
                    url,
                    webhook_id,
                    trusted,
                },
            );
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (i, server) in self.servers.iter().enumerate() {
            if self.servers[..i].iter().any(|s| s.id == server.id) {
                return Err(SyncError::Config(format!(
                    "duplicate server id {}",
                    server.id
                )));
            }
            if server.webhook_id.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "server {} has no webhook_id",
                    server.id
                )));
            }
        }
        if self.worker_interval_secs == 0 || self.tick_interval_secs == 0 {
            return Err(SyncError::Config("intervals must be non-zero".into()));
        }
        Ok(())
    }

    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn power_poll_interval(&self) -> Duration {
        Duration::from_secs(self.power_poll_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
