//! Polls the power supply and turns changes into system events.

use super::events::{SystemEvent, Trigger};
use crate::sensors::battery::{BatterySnapshot, PowerSupply};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Level at or below which the battery counts as low.
pub const BATTERY_LOW_PERCENT: u8 = 15;
/// Level at or above which a low battery counts as okay again.
pub const BATTERY_OKAY_PERCENT: u8 = 20;

pub struct PowerWatcher {
    supply: Arc<dyn PowerSupply>,
    last: Option<BatterySnapshot>,
}

impl PowerWatcher {
    pub fn new(supply: Arc<dyn PowerSupply>) -> Self {
        Self { supply, last: None }
    }

    /// Read the supply once and return the events since the previous read.
    /// The first successful read only establishes a baseline.
    pub fn poll(&mut self) -> Vec<SystemEvent> {
        let current = match self.supply.read() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Vec::new(),
            Err(e) => {
                debug!("[Power] Read failed: {}", e);
                return Vec::new();
            }
        };
        let events = match &self.last {
            Some(previous) => diff(previous, &current),
            None => Vec::new(),
        };
        self.last = Some(current);
        events
    }

    pub async fn run(
        mut self,
        interval: Duration,
        events: mpsc::Sender<Trigger>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for event in self.poll() {
                        debug!("[Power] {}", event);
                        if events.send(event.into()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
        info!("[Power] Watcher stopped");
    }
}

fn diff(previous: &BatterySnapshot, current: &BatterySnapshot) -> Vec<SystemEvent> {
    let mut events = Vec::new();

    match (previous.is_charging(), current.is_charging()) {
        (false, true) => events.push(SystemEvent::PowerConnected),
        (true, false) => events.push(SystemEvent::PowerDisconnected),
        _ => {}
    }

    if let (Some(before), Some(after)) = (previous.level, current.level)
        && before != after
    {
        events.push(SystemEvent::BatteryChanged);
        if before > BATTERY_LOW_PERCENT && after <= BATTERY_LOW_PERCENT {
            events.push(SystemEvent::BatteryLow);
        } else if before < BATTERY_OKAY_PERCENT && after >= BATTERY_OKAY_PERCENT {
            events.push(SystemEvent::BatteryOkay);
        }
    }

    events
}
