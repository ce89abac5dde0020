//! Time of the last system boot, derived from uptime.
//!
//! Boot time computed as `now - uptime` jitters by a second or so between
//! reads. The manager keeps the last reported boot time and holds on to it
//! while new readings stay within the `deadband` setting.

use super::definition::{SensorDefinition, UpdateType};
use super::manager::{SensorContext, SensorManager};
use crate::error::SensorError;
use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, SubsecRound, TimeDelta, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub const LAST_REBOOT: SensorDefinition =
    SensorDefinition::new("last_reboot", "Last Reboot", "mdi:restart")
        .device_class("timestamp")
        .entity_category("diagnostic")
        .update_type(UpdateType::Worker);

const SETTING_DEADBAND: &str = "deadband";
const DEFAULT_DEADBAND_SECS: i64 = 60;

pub trait UptimeSource: Send + Sync {
    fn uptime(&self) -> io::Result<Duration>;
}

/// Reads `/proc/uptime`.
#[derive(Debug, Default)]
pub struct ProcUptime;

impl UptimeSource for ProcUptime {
    fn uptime(&self) -> io::Result<Duration> {
        let content = fs::read_to_string("/proc/uptime")?;
        parse_proc_uptime(&content)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad /proc/uptime"))
    }
}

fn parse_proc_uptime(content: &str) -> Option<Duration> {
    let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

pub struct LastRebootSensorManager {
    uptime: Arc<dyn UptimeSource>,
    last_reported: Mutex<Option<DateTime<Utc>>>,
}

impl LastRebootSensorManager {
    pub fn new(uptime: Arc<dyn UptimeSource>) -> Self {
        Self {
            uptime,
            last_reported: Mutex::new(None),
        }
    }

    /// Boot time for this reading, snapped to the previous one when within
    /// `deadband_secs`.
    fn boot_time(&self, now: DateTime<Utc>, uptime: Duration, deadband_secs: i64) -> DateTime<Utc> {
        let uptime = TimeDelta::from_std(uptime).unwrap_or_else(|_| TimeDelta::zero());
        let computed = (now - uptime).trunc_subsecs(0);

        let mut last = self.last_reported.lock();
        match *last {
            Some(previous) if (computed - previous).num_seconds().abs() <= deadband_secs => previous,
            _ => {
                *last = Some(computed);
                computed
            }
        }
    }
}

#[async_trait]
impl SensorManager for LastRebootSensorManager {
    fn name(&self) -> &'static str {
        "last_reboot"
    }

    fn available_sensors(&self, _ctx: &SensorContext) -> Vec<SensorDefinition> {
        vec![LAST_REBOOT]
    }

    fn has_sensor(&self, _ctx: &SensorContext) -> bool {
        self.uptime.uptime().is_ok()
    }

    async fn request_sensor_update(&self, ctx: &SensorContext) -> Result<(), SensorError> {
        if !self.is_enabled(ctx, &LAST_REBOOT)? {
            return Ok(());
        }

        let deadband = ctx.get_number_setting(&LAST_REBOOT, SETTING_DEADBAND, DEFAULT_DEADBAND_SECS)?;
        let boot = self.boot_time(ctx.now(), self.uptime.uptime()?, deadband.max(0));

        ctx.on_sensor_updated(
            &LAST_REBOOT,
            boot.to_rfc3339_opts(SecondsFormat::Secs, true),
            LAST_REBOOT.icon,
            [
                (
                    "Local Time",
                    json!(boot.with_timezone(&Local).format("%a %b %d %H:%M:%S %Z %Y").to_string()),
                ),
                ("Time in Milliseconds", json!(boot.timestamp_millis())),
            ],
            false,
        )
    }
}
