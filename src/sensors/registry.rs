//! The fixed set of sensor managers, resolved once at startup.

use super::battery::{BatterySensorManager, PowerSupply};
use super::definition::SensorDefinition;
use super::last_reboot::{LastRebootSensorManager, UptimeSource};
use super::last_update::LastUpdateSensorManager;
use super::manager::{SensorContext, SensorManager};
use std::sync::Arc;

#[derive(Clone)]
pub struct SensorRegistry {
    managers: Vec<Arc<dyn SensorManager>>,
}

impl SensorRegistry {
    pub fn new(managers: Vec<Arc<dyn SensorManager>>) -> Self {
        Self { managers }
    }

    /// Managers shipped with the daemon.
    pub fn builtin(power: Arc<dyn PowerSupply>, uptime: Arc<dyn UptimeSource>) -> Self {
        Self::new(vec![
            Arc::new(BatterySensorManager::new(power)),
            Arc::new(LastRebootSensorManager::new(uptime)),
            Arc::new(LastUpdateSensorManager),
        ])
    }

    pub fn managers(&self) -> &[Arc<dyn SensorManager>] {
        &self.managers
    }

    /// The manager that provides `sensor_id`, with its definition.
    pub fn find(
        &self,
        ctx: &SensorContext,
        sensor_id: &str,
    ) -> Option<(Arc<dyn SensorManager>, SensorDefinition)> {
        self.managers.iter().find_map(|manager| {
            manager
                .available_sensors(ctx)
                .into_iter()
                .find(|s| s.id == sensor_id)
                .map(|s| (manager.clone(), s))
        })
    }

    pub fn definitions(&self, ctx: &SensorContext) -> Vec<SensorDefinition> {
        self.managers
            .iter()
            .flat_map(|m| m.available_sensors(ctx))
            .collect()
    }
}
