//! Periodic safety-net pass.

use super::dispatcher::UpdateDispatcher;
use super::events::Trigger;
use crate::error::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct SensorWorker {
    dispatcher: Arc<UpdateDispatcher>,
}

impl SensorWorker {
    pub fn new(dispatcher: Arc<UpdateDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run a full pass if anything could need syncing, then drop rows that
    /// belong to servers no longer configured.
    pub async fn do_work(&self) -> Result<()> {
        let ctx = self.dispatcher.engine().context();
        let store = ctx.store();
        let servers = ctx.servers();

        if store.enabled_count(None) > 0 || servers.any_supports_disabled_sensors() {
            self.dispatcher.on_receive(Trigger::UpdateAll).await;
        }

        let removed = store.remove_orphans(&servers.ids())?;
        if removed > 0 {
            info!("[Worker] Removed {} sensor rows of unknown servers", removed);
        }
        Ok(())
    }

    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.do_work().await {
                        warn!("[Worker] Pass failed: {}", e);
                    }
                }
            }
        }
        info!("[Worker] Stopped");
    }
}
