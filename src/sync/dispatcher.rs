//! Turns triggers into sensor update passes.
//!
//! A pass refreshes the managers, then reconciles every server
//! concurrently and waits for all of them.

use super::events::{SystemEvent, Trigger};
use super::reconcile::{SyncEngine, SyncReport};
use crate::config::SensorUpdateFrequency;
use crate::sensors::battery::PowerSupply;
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

pub struct UpdateDispatcher {
    engine: Arc<SyncEngine>,
    power: Arc<dyn PowerSupply>,
    frequency: SensorUpdateFrequency,
    skippable: HashMap<SystemEvent, Vec<String>>,
    settle_delay: Duration,
    cancel: CancellationToken,
}

impl UpdateDispatcher {
    pub fn new(engine: Arc<SyncEngine>, power: Arc<dyn PowerSupply>) -> Self {
        Self {
            engine,
            power,
            frequency: SensorUpdateFrequency::default(),
            skippable: HashMap::new(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_frequency(mut self, frequency: SensorUpdateFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Skip `event` whenever every one of `sensor_ids` is disabled on every
    /// server.
    pub fn with_skippable<I, S>(mut self, event: SystemEvent, sensor_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skippable
            .insert(event, sensor_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Token that aborts in-flight bulk updates when cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Handle one trigger. Returns the number of passes that ran.
    pub async fn on_receive(&self, trigger: Trigger) -> usize {
        if let Some(event) = trigger.event() {
            if self.is_skippable(event) {
                debug!("[Dispatcher] Skipping {}: all related sensors disabled", event);
                return 0;
            }
            if event == SystemEvent::TimeTick && !self.fast_updates_active() {
                return 0;
            }
        }

        self.update_sensors(&trigger).await;

        if trigger.event().is_some_and(SystemEvent::is_battery_transition) {
            // Charger and level values lag the broadcast
            tokio::select! {
                _ = self.cancel.cancelled() => return 1,
                _ = tokio::time::sleep(self.settle_delay) => {}
            }
            self.update_sensors(&trigger).await;
            return 2;
        }
        1
    }

    fn is_skippable(&self, event: SystemEvent) -> bool {
        let Some(sensor_ids) = self.skippable.get(&event) else {
            return false;
        };
        let store = self.engine.context().store();
        !sensor_ids.is_empty()
            && sensor_ids
                .iter()
                .all(|id| store.get(id).iter().all(|record| !record.enabled))
    }

    fn fast_updates_active(&self) -> bool {
        match self.frequency {
            SensorUpdateFrequency::Normal => false,
            SensorUpdateFrequency::FastAlways => true,
            SensorUpdateFrequency::FastWhileCharging => match self.power.read() {
                Ok(battery) => battery.is_some_and(|b| b.is_charging()),
                Err(e) => {
                    debug!("[Dispatcher] Unable to read charging state: {}", e);
                    false
                }
            },
        }
    }

    /// Refresh managers, then reconcile every server.
    pub async fn update_sensors(&self, trigger: &Trigger) -> Vec<SyncReport> {
        let ctx = self.engine.context();

        for manager in self.engine.registry().managers() {
            if let Trigger::UpdateSensor(sensor_id) = trigger
                && !manager.owns(ctx, sensor_id)
            {
                continue;
            }
            if !manager.has_sensor(ctx) {
                continue;
            }
            if let Err(e) = manager.request_sensor_update_for(ctx, trigger).await {
                warn!("[Dispatcher] {} failed to update: {}", manager.name(), e);
            }
        }

        let servers = ctx.servers().servers();
        let results = join_all(
            servers
                .iter()
                .map(|server| self.engine.sync_server(server, &self.cancel)),
        )
        .await;

        let mut reports = Vec::with_capacity(results.len());
        for (server, result) in servers.iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!("[Dispatcher] Sync with {} failed: {}", server.name, e),
            }
        }
        info!(
            "[Dispatcher] Pass for {} finished, {}/{} servers synced",
            trigger.name(),
            reports.len(),
            servers.len()
        );
        reports
    }
}
