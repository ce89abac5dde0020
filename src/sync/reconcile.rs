//! Per-server reconciliation of local sensor rows against a server.
//!
//! One pass fetches the server config, walks every sensor the registry
//! knows about and decides, per sensor, whether to register, adopt the
//! server's enabled flag, or re-register after a version change. Value
//! updates that the server has not seen yet are collected and pushed in a
//! single batch at the end.

use crate::error::{IntegrationError, Result};
use crate::integration::{SensorRegistration, Server};
use crate::notifier::{Notifier, PermissionNotice};
use crate::sensors::{SensorContext, SensorDefinition, SensorManager, SensorRegistry};
use crate::store::{FullSensor, RegistrationState};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one pass did against one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub server_id: u32,
    pub registrations: usize,
    pub enabled_flips: usize,
    pub permission_notices: usize,
    pub updates_pushed: usize,
}

impl SyncReport {
    fn new(server_id: u32) -> Self {
        Self {
            server_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registrations == 0
            && self.enabled_flips == 0
            && self.permission_notices == 0
            && self.updates_pushed == 0
    }
}

/// A value queued for the bulk update, with the local pair it carries.
struct PendingUpdate {
    state: String,
    icon: String,
    payload: SensorRegistration,
}

/// Server facts that stay fixed for one pass.
struct PassState {
    supports_disabled: bool,
    trusted: bool,
    core_status: Option<HashMap<String, bool>>,
    core_version: String,
    reachable: bool,
}

pub struct SyncEngine {
    registry: SensorRegistry,
    ctx: SensorContext,
    notifier: Arc<dyn Notifier>,
    app_version: String,
}

impl SyncEngine {
    pub fn new(
        registry: SensorRegistry,
        ctx: SensorContext,
        notifier: Arc<dyn Notifier>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            ctx,
            notifier,
            app_version: app_version.into(),
        }
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn context(&self) -> &SensorContext {
        &self.ctx
    }

    /// Reconcile every known sensor with one server.
    ///
    /// A failed config fetch returns the error before anything local is
    /// touched. Failures on single registrations are logged and do not end
    /// the pass.
    pub async fn sync_server(
        &self,
        server: &Server,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let config = match server.fetch_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("[Sync] {}: unable to fetch config: {}", server.name, e);
                return Err(e.into());
            }
        };

        let store = self.ctx.store();
        let supports_disabled = config.supports_disabled_sensors();
        let core_status = (supports_disabled
            && (config.trusted || store.enabled_count(Some(server.id)) > 0))
            .then(|| config.core_sensor_status());

        let mut pass = PassState {
            supports_disabled,
            trusted: config.trusted,
            core_status,
            core_version: config.version.to_string(),
            reachable: true,
        };
        let mut report = SyncReport::new(server.id);
        let mut pending = Vec::new();

        for manager in self.registry.managers() {
            let has_sensor = manager.has_sensor(&self.ctx);
            for definition in manager.available_sensors(&self.ctx) {
                let Some(full) = store.get_full(definition.id, server.id) else {
                    continue;
                };
                self.reconcile_sensor(
                    server,
                    manager.as_ref(),
                    &definition,
                    &full,
                    has_sensor,
                    &mut pass,
                    &mut report,
                )
                .await?;

                let Some(current) = store.get_full(definition.id, server.id) else {
                    continue;
                };
                let payload =
                    SensorRegistration::new(&current, &definition, pass.supports_disabled);
                let sensor = &current.sensor;
                if has_sensor
                    && !payload.icon.trim().is_empty()
                    && sensor.enabled
                    && sensor.registration.is_registered()
                    && sensor.has_unsent_changes()
                {
                    pending.push(PendingUpdate {
                        state: sensor.state.clone(),
                        icon: sensor.icon.clone(),
                        payload,
                    });
                }
            }
        }

        if !pending.is_empty() {
            report.updates_pushed = self.push_updates(server, pending, cancel).await?;
        }

        if report.is_empty() {
            debug!("[Sync] {}: nothing to do", server.name);
        } else {
            info!(
                "[Sync] {}: {} registered, {} enable flips, {} permission notices, {} updates",
                server.name,
                report.registrations,
                report.enabled_flips,
                report.permission_notices,
                report.updates_pushed
            );
        }
        Ok(report)
    }

    /// Apply the registration rules to one sensor.
    #[allow(clippy::too_many_arguments)]
    async fn reconcile_sensor(
        &self,
        server: &Server,
        manager: &dyn SensorManager,
        definition: &SensorDefinition,
        full: &FullSensor,
        has_sensor: bool,
        pass: &mut PassState,
        report: &mut SyncReport,
    ) -> Result<()> {
        let store = self.ctx.store();
        let sensor = &full.sensor;
        let registration = sensor.registration;
        let payload = SensorRegistration::new(full, definition, pass.supports_disabled);
        let can_be_registered = has_sensor && !payload.icon.trim().is_empty();
        let core_enabled = pass
            .core_status
            .as_ref()
            .and_then(|status| status.get(definition.id).copied());

        let needs_registration = (registration == RegistrationState::Unregistered
            && (sensor.enabled || pass.supports_disabled))
            || (pass.supports_disabled && !registration.matches(sensor.enabled))
            || (registration.is_registered()
                && pass.core_status.is_some()
                && core_enabled.is_none());

        if needs_registration {
            if !can_be_registered {
                debug!(
                    "[Sync] {}: {} needs registration but cannot be registered",
                    server.name, definition.id
                );
                return Ok(());
            }
            return self
                .register(server, &payload, sensor.enabled, pass, report)
                .await;
        }

        if let Some(core_enabled) = core_enabled
            && !registration.matches(core_enabled)
        {
            if !pass.trusted {
                debug!(
                    "[Sync] {}: untrusted, pushing local state for {}",
                    server.name, definition.id
                );
                return self
                    .register(server, &payload, sensor.enabled, pass, report)
                    .await;
            }

            if core_enabled && !manager.check_permission(&self.ctx, definition.id) {
                let missing = self
                    .ctx
                    .missing_permissions(&manager.required_permissions(definition.id));
                self.notifier.notify_permission_missing(PermissionNotice {
                    server_id: server.id,
                    sensor_id: definition.id.to_string(),
                    sensor_name: definition.name.to_string(),
                    missing_permissions: missing.into_iter().map(String::from).collect(),
                });
                report.permission_notices += 1;
                return self
                    .register(server, &payload, sensor.enabled, pass, report)
                    .await;
            }

            info!(
                "[Sync] {}: server {} {}",
                server.name,
                if core_enabled { "enabled" } else { "disabled" },
                definition.id
            );
            store.set_enabled_and_registration(
                definition.id,
                server.id,
                core_enabled,
                RegistrationState::from_enabled(core_enabled),
            )?;
            report.enabled_flips += 1;
            return Ok(());
        }

        let version_drift = sensor.app_registration.as_deref() != Some(self.app_version.as_str())
            || sensor.core_registration.as_deref() != Some(pass.core_version.as_str());
        if can_be_registered
            && pass.reachable
            && (sensor.enabled || pass.supports_disabled)
            && version_drift
        {
            debug!(
                "[Sync] {}: re-registering {} after version change",
                server.name, definition.id
            );
            return self
                .register(server, &payload, sensor.enabled, pass, report)
                .await;
        }

        Ok(())
    }

    async fn register(
        &self,
        server: &Server,
        payload: &SensorRegistration,
        enabled: bool,
        pass: &mut PassState,
        report: &mut SyncReport,
    ) -> Result<()> {
        match server.client().register_sensor(payload).await {
            Ok(()) => {
                self.ctx.store().mark_registered(
                    &payload.unique_id,
                    server.id,
                    RegistrationState::from_enabled(enabled),
                    &self.app_version,
                    &pass.core_version,
                )?;
                report.registrations += 1;
                Ok(())
            }
            Err(e) => {
                if e.is_connectivity() {
                    pass.reachable = false;
                }
                warn!(
                    "[Sync] {}: failed to register {}: {}",
                    server.name, payload.unique_id, e
                );
                Ok(())
            }
        }
    }

    /// Push queued values in one call and settle each row's watermark.
    async fn push_updates(
        &self,
        server: &Server,
        pending: Vec<PendingUpdate>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let store = self.ctx.store();
        let batch: Vec<SensorRegistration> = pending.iter().map(|p| p.payload.clone()).collect();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IntegrationError::Cancelled),
            result = server.client().update_sensors(&batch) => result,
        };

        match result {
            Ok(true) => {
                for update in &pending {
                    store.update_last_sent(
                        &update.payload.unique_id,
                        server.id,
                        Some(update.state.clone()),
                        Some(update.icon.clone()),
                    )?;
                }
                debug!("[Sync] {}: pushed {} updates", server.name, pending.len());
                Ok(pending.len())
            }
            Err(e) if e.is_soft() => {
                warn!(
                    "[Sync] {}: sensor update not delivered, retrying next pass: {}",
                    server.name, e
                );
                Ok(0)
            }
            outcome => {
                match outcome {
                    Ok(_) => warn!(
                        "[Sync] {}: server rejected sensor update, re-registering {} sensors",
                        server.name,
                        pending.len()
                    ),
                    Err(e) => warn!(
                        "[Sync] {}: sensor update failed, re-registering {} sensors: {}",
                        server.name,
                        pending.len(),
                        e
                    ),
                }
                for update in &pending {
                    store.reset_registration(&update.payload.unique_id, server.id)?;
                }
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::definition::UpdateType;
    use crate::store::SensorStore;
    use crate::test_support::{
        FakeIntegration, FakeManager, RecordingNotifier, UpdateOutcome, context_with, server,
    };
    use std::time::Duration;

    const APP_VERSION: &str = "1.4.0";
    const CURRENT: &str = "2023.4.1";

    const BATTERY_LEVEL: SensorDefinition =
        SensorDefinition::new("battery_level", "Battery Level", "mdi:battery")
            .unit("%")
            .enabled_by_default();
    const GEOCODED: SensorDefinition =
        SensorDefinition::new("geocoded_location", "Geocoded Location", "mdi:map")
            .update_type(UpdateType::Location);

    struct Harness {
        engine: SyncEngine,
        fake: Arc<FakeIntegration>,
        server: Arc<Server>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn new(fake: FakeIntegration, manager: FakeManager, granted: &[&str]) -> Self {
            let fake = Arc::new(fake);
            let server = server(1, fake.clone());
            let ctx = context_with(vec![server.clone()], granted);
            let notifier = Arc::new(RecordingNotifier::default());
            let engine = SyncEngine::new(
                SensorRegistry::new(vec![Arc::new(manager) as Arc<dyn SensorManager>]),
                ctx,
                notifier.clone(),
                APP_VERSION,
            );
            Self {
                engine,
                fake,
                server,
                notifier,
            }
        }

        fn battery(fake: FakeIntegration) -> Self {
            Self::new(fake, FakeManager::new("fake", vec![BATTERY_LEVEL]), &[])
        }

        fn store(&self) -> &Arc<dyn SensorStore> {
            self.engine.context().store()
        }

        fn seed(&self, edit: impl FnOnce(&mut crate::store::SensorRecord)) {
            let mut record = crate::store::SensorRecord::new("battery_level", 1, true);
            record.apply_definition(&BATTERY_LEVEL);
            record.state = "80".into();
            record.icon = "mdi:battery-80".into();
            edit(&mut record);
            self.store().upsert(record).unwrap();
        }

        /// Registered, stamped with current versions, watermark at the
        /// current value.
        fn seed_in_sync(&self, edit: impl FnOnce(&mut crate::store::SensorRecord)) {
            self.seed(|r| {
                r.registration = RegistrationState::RegisteredEnabled;
                r.app_registration = Some(APP_VERSION.into());
                r.core_registration = Some(CURRENT.into());
                r.last_sent_state = Some("80".into());
                r.last_sent_icon = Some("mdi:battery-80".into());
                edit(r);
            });
        }

        fn record(&self) -> crate::store::SensorRecord {
            self.store().get_for_server("battery_level", 1).unwrap()
        }

        async fn sync(&self) -> Result<SyncReport> {
            self.engine
                .sync_server(&self.server, &CancellationToken::new())
                .await
        }
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_pushed() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.seed_in_sync(|_| {});

        let report = h.sync().await.unwrap();

        assert!(report.is_empty());
        assert_eq!(h.fake.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_new_enabled_sensor_registers_without_entity() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).trusted(true));
        h.seed(|_| {});

        let report = h.sync().await.unwrap();

        assert_eq!(report.registrations, 1);
        let sent = h.fake.registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].unique_id, "battery_level");
        assert_eq!(sent[0].disabled, Some(false));
        let record = h.record();
        assert_eq!(record.registration, RegistrationState::RegisteredEnabled);
        assert_eq!(record.app_registration.as_deref(), Some(APP_VERSION));
        assert_eq!(record.core_registration.as_deref(), Some(CURRENT));
        let batches = h.fake.update_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].unique_id, "battery_level");
        assert_eq!(report.updates_pushed, 1);
        assert_eq!(record.last_sent_state.as_deref(), Some("80"));
        assert_eq!(record.last_sent_icon.as_deref(), Some("mdi:battery-80"));
    }

    #[tokio::test]
    async fn test_registration_wins_over_core_disabled() {
        let h = Harness::battery(
            FakeIntegration::new(CURRENT)
                .trusted(true)
                .with_entity("battery_level", Some(true)),
        );
        h.seed(|_| {});

        h.sync().await.unwrap();

        assert_eq!(h.fake.registrations().len(), 1);
        let record = h.record();
        assert!(record.enabled);
        assert_eq!(record.registration, RegistrationState::RegisteredEnabled);
    }

    #[tokio::test]
    async fn test_untrusted_server_gets_local_state() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(true)));
        h.seed_in_sync(|_| {});

        let report = h.sync().await.unwrap();

        let sent = h.fake.registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].disabled, Some(false));
        assert_eq!(report.enabled_flips, 0);
        assert!(h.record().enabled);
    }

    #[tokio::test]
    async fn test_trusted_server_disables_sensor() {
        let h = Harness::battery(
            FakeIntegration::new(CURRENT)
                .trusted(true)
                .with_entity("battery_level", Some(true)),
        );
        h.seed_in_sync(|r| r.state = "75".into());

        let report = h.sync().await.unwrap();

        assert_eq!(report.enabled_flips, 1);
        assert!(h.fake.registrations().is_empty());
        let record = h.record();
        assert!(!record.enabled);
        assert_eq!(record.registration, RegistrationState::RegisteredDisabled);
        // disabled sensors are not pushed
        assert!(h.fake.update_batches().is_empty());
    }

    #[tokio::test]
    async fn test_trusted_server_enables_sensor_with_permission() {
        let h = Harness::new(
            FakeIntegration::new(CURRENT)
                .trusted(true)
                .with_entity("battery_level", Some(false)),
            FakeManager::new("fake", vec![BATTERY_LEVEL]).requiring("battery"),
            &["battery"],
        );
        h.seed_in_sync(|r| {
            r.enabled = false;
            r.registration = RegistrationState::RegisteredDisabled;
        });

        let report = h.sync().await.unwrap();

        assert_eq!(report.enabled_flips, 1);
        let record = h.record();
        assert!(record.enabled);
        assert_eq!(record.registration, RegistrationState::RegisteredEnabled);
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_permission_gap_registers_local_state_and_notifies_once() {
        let h = Harness::new(
            FakeIntegration::new(CURRENT)
                .trusted(true)
                .with_entity("battery_level", Some(false)),
            FakeManager::new("fake", vec![BATTERY_LEVEL]).requiring("battery"),
            &[],
        );
        h.seed_in_sync(|r| {
            r.enabled = false;
            r.registration = RegistrationState::RegisteredDisabled;
        });

        let report = h.sync().await.unwrap();

        assert!(!h.record().enabled);
        let sent = h.fake.registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].disabled, Some(true));
        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].missing_permissions, vec!["battery".to_string()]);
        assert_eq!(report.permission_notices, 1);
    }

    #[tokio::test]
    async fn test_version_drift_reregisters_once() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.seed_in_sync(|r| {
            r.app_registration = Some("1.3.9".into());
            r.core_registration = Some("2023.1.0".into());
        });

        h.sync().await.unwrap();
        assert_eq!(h.fake.registrations().len(), 1);
        let record = h.record();
        assert_eq!(record.app_registration.as_deref(), Some(APP_VERSION));
        assert_eq!(record.core_registration.as_deref(), Some(CURRENT));

        h.sync().await.unwrap();
        assert_eq!(h.fake.registrations().len(), 1);
    }

    #[tokio::test]
    async fn test_core_status_check_precedes_version_drift() {
        let h = Harness::battery(
            FakeIntegration::new(CURRENT)
                .trusted(true)
                .with_entity("battery_level", Some(true)),
        );
        h.seed_in_sync(|r| r.app_registration = Some("1.0.0".into()));

        let report = h.sync().await.unwrap();

        assert_eq!(report.enabled_flips, 1);
        assert!(h.fake.registrations().is_empty());
        assert_eq!(h.record().app_registration.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_disabled_sensor_without_core_entry_is_left_alone() {
        let h = Harness::battery(FakeIntegration::new("2021.12.0"));
        h.seed(|r| {
            r.enabled = false;
            r.registration = RegistrationState::RegisteredDisabled;
            r.app_registration = Some(APP_VERSION.into());
            r.core_registration = Some("2021.12.0".into());
        });

        let report = h.sync().await.unwrap();

        assert!(report.is_empty());
        assert_eq!(h.fake.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_untrusted_server_without_enabled_sensors_skips_core_status() {
        let h = Harness::battery(FakeIntegration::new(CURRENT));
        h.seed(|r| {
            r.enabled = false;
            r.registration = RegistrationState::RegisteredDisabled;
            r.app_registration = Some(APP_VERSION.into());
            r.core_registration = Some(CURRENT.into());
        });

        let report = h.sync().await.unwrap();

        assert!(report.is_empty());
        assert_eq!(h.fake.network_calls(), 0);
        assert_eq!(h.record().registration, RegistrationState::RegisteredDisabled);
    }

    #[tokio::test]
    async fn test_missing_row_is_skipped() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).trusted(true));
        let report = h.sync().await.unwrap();
        assert!(report.is_empty());
        assert!(h.store().get_all().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_without_hardware_is_not_registered() {
        let h = Harness::new(
            FakeIntegration::new(CURRENT).trusted(true),
            FakeManager::new("fake", vec![BATTERY_LEVEL]).absent(),
            &[],
        );
        h.seed(|_| {});

        h.sync().await.unwrap();

        assert!(h.fake.registrations().is_empty());
        assert_eq!(h.record().registration, RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn test_config_failure_changes_nothing() {
        let h = Harness::battery(
            FakeIntegration::new(CURRENT)
                .failing_config(|| IntegrationError::Connect("refused".into())),
        );
        h.seed(|_| {});
        let before = h.record();

        let err = h.sync().await.unwrap_err();

        assert!(matches!(
            err,
            crate::error::SyncError::Integration(IntegrationError::Connect(_))
        ));
        assert_eq!(h.record(), before);
        assert_eq!(h.fake.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_changed_value_is_pushed_and_watermark_advances() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.seed_in_sync(|r| {
            r.state = "64".into();
            r.icon = "mdi:battery-60".into();
        });

        let report = h.sync().await.unwrap();

        assert_eq!(report.updates_pushed, 1);
        let batches = h.fake.update_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].state, serde_json::json!("64"));
        let record = h.record();
        assert_eq!(record.last_sent_state.as_deref(), Some("64"));
        assert_eq!(record.last_sent_icon.as_deref(), Some("mdi:battery-60"));

        h.sync().await.unwrap();
        assert_eq!(h.fake.update_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_soft_update_failure_keeps_registration() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.fake
            .set_update_outcome(UpdateOutcome::Fail(|| IntegrationError::Timeout("30s".into())));
        h.seed_in_sync(|r| r.state = "64".into());

        let report = h.sync().await.unwrap();

        assert_eq!(report.updates_pushed, 0);
        let record = h.record();
        assert_eq!(record.registration, RegistrationState::RegisteredEnabled);
        assert_eq!(record.last_sent_state.as_deref(), Some("80"));
    }

    #[tokio::test]
    async fn test_hard_update_failure_resets_registration() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.fake
            .set_update_outcome(UpdateOutcome::Fail(|| IntegrationError::Http { status: 410 }));
        h.seed_in_sync(|r| r.state = "64".into());

        h.sync().await.unwrap();

        let record = h.record();
        assert_eq!(record.registration, RegistrationState::Unregistered);
        assert_eq!(record.last_sent_state, None);
        assert_eq!(record.last_sent_icon, None);
    }

    #[tokio::test]
    async fn test_rejected_update_resets_registration() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).with_entity("battery_level", Some(false)));
        h.fake.set_update_outcome(UpdateOutcome::Reject);
        h.seed_in_sync(|r| r.state = "64".into());

        h.sync().await.unwrap();

        assert_eq!(h.record().registration, RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn test_cancelled_update_is_soft() {
        let h = Harness::battery(
            FakeIntegration::new(CURRENT)
                .with_entity("battery_level", Some(false))
                .slow_updates(Duration::from_secs(30)),
        );
        h.seed_in_sync(|r| r.state = "64".into());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h.engine.sync_server(&h.server, &cancel).await.unwrap();

        assert_eq!(report.updates_pushed, 0);
        assert_eq!(h.record().registration, RegistrationState::RegisteredEnabled);
    }

    #[tokio::test]
    async fn test_unreachable_server_stops_version_reregistration() {
        const OTHER: SensorDefinition = SensorDefinition::new("other", "Other", "mdi:star");
        let h = Harness::new(
            FakeIntegration::new("2022.5.0"),
            FakeManager::new("fake", vec![BATTERY_LEVEL, OTHER]),
            &[],
        );
        h.fake
            .fail_register(Some(|| IntegrationError::Connect("refused".into())));
        h.seed_in_sync(|r| r.app_registration = Some("1.0.0".into()));
        let mut other = crate::store::SensorRecord::new("other", 1, true);
        other.registration = RegistrationState::RegisteredEnabled;
        other.icon = "mdi:star".into();
        h.store().upsert(other).unwrap();

        h.sync().await.unwrap();

        // the second drifted sensor is not attempted
        assert_eq!(h.fake.registrations().len(), 1);
        assert_eq!(h.record().app_registration.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_registered_sensor_missing_from_core_is_reregistered() {
        let h = Harness::battery(FakeIntegration::new(CURRENT).trusted(true));
        h.seed_in_sync(|_| {});

        let report = h.sync().await.unwrap();

        assert_eq!(report.registrations, 1);
        assert_eq!(h.record().registration, RegistrationState::RegisteredEnabled);
    }

    #[tokio::test]
    async fn test_old_server_does_not_send_disabled_flag() {
        let h = Harness::new(
            FakeIntegration::new("2022.5.0"),
            FakeManager::new("fake", vec![GEOCODED]),
            &[],
        );
        let mut record = crate::store::SensorRecord::new("geocoded_location", 1, true);
        record.state = "Home".into();
        h.store().upsert(record).unwrap();

        h.sync().await.unwrap();

        let sent = h.fake.registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].disabled, None);
        assert_eq!(sent[0].icon, "mdi:map");
    }
}
