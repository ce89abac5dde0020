//! User-facing notices raised by the sync engine.
//!
//! The only notice today is "the server wants this sensor enabled, but a
//! required permission is missing".

use log::warn;

/// A sensor the server asked to enable but which lacks permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionNotice {
    pub server_id: u32,
    pub sensor_id: String,
    pub sensor_name: String,
    pub missing_permissions: Vec<String>,
}

impl PermissionNotice {
    /// Link that opens the sensor's settings page.
    pub fn deep_link(&self) -> String {
        format!(
            "companion://sensors/{}?server={}",
            self.sensor_id, self.server_id
        )
    }

    pub fn message(&self) -> String {
        format!(
            "{} could not be enabled because it is missing permissions: {}",
            self.sensor_name,
            self.missing_permissions.join(", ")
        )
    }
}

pub trait Notifier: Send + Sync {
    fn notify_permission_missing(&self, notice: PermissionNotice);
}

/// Writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_permission_missing(&self, notice: PermissionNotice) {
        warn!("[Notify] {} ({})", notice.message(), notice.deep_link());
    }
}
