//! Reports which trigger caused the most recent sensor pass.

use super::definition::{SensorDefinition, UpdateType};
use super::manager::{NO_ATTRIBUTES, SensorContext, SensorManager};
use crate::error::SensorError;
use crate::sync::events::Trigger;
use async_trait::async_trait;

pub const LAST_UPDATE: SensorDefinition =
    SensorDefinition::new("last_update", "Last Update Trigger", "mdi:update")
        .entity_category("diagnostic")
        .update_type(UpdateType::Custom);

#[derive(Debug, Default)]
pub struct LastUpdateSensorManager;

#[async_trait]
impl SensorManager for LastUpdateSensorManager {
    fn name(&self) -> &'static str {
        "last_update"
    }

    fn available_sensors(&self, _ctx: &SensorContext) -> Vec<SensorDefinition> {
        vec![LAST_UPDATE]
    }

    async fn request_sensor_update(&self, _ctx: &SensorContext) -> Result<(), SensorError> {
        // Nothing to report without a trigger
        Ok(())
    }

    async fn request_sensor_update_for(
        &self,
        ctx: &SensorContext,
        trigger: &Trigger,
    ) -> Result<(), SensorError> {
        if !self.is_enabled(ctx, &LAST_UPDATE)? {
            return Ok(());
        }
        ctx.on_sensor_updated(
            &LAST_UPDATE,
            trigger.name(),
            LAST_UPDATE.icon,
            NO_ATTRIBUTES,
            false,
        )
    }
}
