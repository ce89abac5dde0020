use clap::{Parser, Subcommand};
use companion_sensor_sync::clock::SystemClock;
use companion_sensor_sync::config::{self, Config};
use companion_sensor_sync::error::{Result, SyncError};
use companion_sensor_sync::integration::ServerManager;
use companion_sensor_sync::notifier::LogNotifier;
use companion_sensor_sync::sensors::battery::{
    BATTERY_HEALTH, BATTERY_LEVEL, BATTERY_STATE, BATTERY_TEMPERATURE, CHARGER_TYPE, IS_CHARGING,
    PowerSupply, SysfsPowerSupply,
};
use companion_sensor_sync::sensors::last_reboot::ProcUptime;
use companion_sensor_sync::sensors::{GrantedPermissions, SensorContext, SensorRegistry};
use companion_sensor_sync::store::JsonSensorStore;
use companion_sensor_sync::sync::{
    PowerWatcher, SensorWorker, SyncEngine, SystemEvent, Trigger, UpdateDispatcher,
};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Parser)]
#[command(name = "companion-sensor-sync")]
#[command(about = "Registers device sensors with home-automation servers and keeps them in sync")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "SENSOR_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync daemon (default)
    Run,
    /// Run a single update pass and exit
    Update {
        /// Only refresh the managers that own this sensor
        #[arg(long, conflicts_with = "event")]
        sensor: Option<String>,

        /// Handle the pass as this system event, e.g. power_connected
        #[arg(long)]
        event: Option<SystemEvent>,
    },
    /// Show the stored sensor rows
    List,
    /// Enable a sensor and push the change
    Enable {
        sensor: String,

        /// Only on this server
        #[arg(long)]
        server: Option<u32>,
    },
    /// Disable a sensor and push the change
    Disable {
        sensor: String,

        /// Only on this server
        #[arg(long)]
        server: Option<u32>,
    },
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

struct App {
    config: Config,
    dispatcher: Arc<UpdateDispatcher>,
    power: Arc<dyn PowerSupply>,
    cancel: CancellationToken,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let servers = ServerManager::from_settings(&config.servers, config.request_timeout())?;
        if servers.is_empty() {
            warn!("[Main] No servers configured");
        }

        let ctx = SensorContext::new(
            Arc::new(JsonSensorStore::open(config.store_path.clone())),
            Arc::new(servers),
            Arc::new(GrantedPermissions::new(config.granted_permissions.iter().cloned())),
            Arc::new(SystemClock),
        );
        let power: Arc<dyn PowerSupply> =
            Arc::new(SysfsPowerSupply::new(config.power_supply_root.clone()));
        let registry = SensorRegistry::builtin(power.clone(), Arc::new(ProcUptime));
        let engine = Arc::new(SyncEngine::new(
            registry,
            ctx,
            Arc::new(LogNotifier),
            config.app_version.clone(),
        ));

        let cancel = CancellationToken::new();
        let battery_sensors = [
            BATTERY_LEVEL.id,
            BATTERY_STATE.id,
            IS_CHARGING.id,
            CHARGER_TYPE.id,
            BATTERY_HEALTH.id,
            BATTERY_TEMPERATURE.id,
        ];
        let dispatcher = UpdateDispatcher::new(engine, power.clone())
            .with_frequency(config.update_frequency)
            .with_skippable(SystemEvent::BatteryChanged, battery_sensors)
            .with_settle_delay(config.settle_delay())
            .with_cancellation(cancel.clone());

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            power,
            cancel,
        })
    }

    fn context(&self) -> &SensorContext {
        self.dispatcher.engine().context()
    }

    async fn run_daemon(self) -> Result<()> {
        info!("Starting companion sensor sync {}", self.config.app_version);
        info!("  Servers: {}", self.context().servers().servers().len());
        info!("  Update frequency: {}", self.config.update_frequency);
        info!("  Store: {}", self.config.store_path.display());

        let (tx, mut rx) = mpsc::channel::<Trigger>(32);

        let tick_tx = tx.clone();
        let tick_interval = self.config.tick_interval();
        let tick_cancel = self.cancel.clone();
        let tick_task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + tick_interval, tick_interval);
            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tick_tx.send(SystemEvent::TimeTick.into()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let power_task = tokio::spawn(PowerWatcher::new(self.power.clone()).run(
            self.config.power_poll_interval(),
            tx.clone(),
            self.cancel.clone(),
        ));

        let worker_task = tokio::spawn(
            SensorWorker::new(self.dispatcher.clone())
                .run(self.config.worker_interval(), self.cancel.clone()),
        );

        let passes = TaskTracker::new();
        let event_passes = passes.clone();
        let dispatcher = self.dispatcher.clone();
        let event_cancel = self.cancel.clone();
        let event_task = tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    _ = event_cancel.cancelled() => break,
                    trigger = rx.recv() => match trigger {
                        Some(trigger) => trigger,
                        None => break,
                    },
                };
                let dispatcher = dispatcher.clone();
                event_passes.spawn(async move {
                    dispatcher.on_receive(trigger).await;
                });
            }
        });

        if tx.send(Trigger::UpdateAll).await.is_err() {
            warn!("[Main] Event loop closed before the first pass");
        }
        drop(tx);

        info!("Companion sensor sync is running");
        info!("  - Press Ctrl+C to exit");

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        self.cancel.cancel();

        for (name, task) in [
            ("tick", tick_task),
            ("power", power_task),
            ("worker", worker_task),
            ("events", event_task),
        ] {
            if let Err(e) = task.await {
                error!("[Main] {} task failed: {}", name, e);
            }
        }
        passes.close();
        passes.wait().await;

        info!("Companion sensor sync stopped");
        Ok(())
    }

    async fn update_once(&self, trigger: Trigger) {
        let passes = self.dispatcher.on_receive(trigger).await;
        if passes == 0 {
            println!("Pass skipped");
        }
    }

    fn list(&self) {
        let ctx = self.context();
        let mut records = ctx.store().get_all();
        records.sort_by(|a, b| (a.server_id, &a.sensor_id).cmp(&(b.server_id, &b.sensor_id)));
        if records.is_empty() {
            println!("No sensors stored yet");
        }
        for record in &records {
            println!(
                "server {:<3} {:<24} {:<8} {:<20} {} ({})",
                record.server_id,
                record.sensor_id,
                if record.enabled { "enabled" } else { "disabled" },
                format!("{:?}", record.registration),
                record.state,
                record.icon
            );
        }

        let unseen: Vec<_> = self
            .dispatcher
            .engine()
            .registry()
            .definitions(ctx)
            .into_iter()
            .filter(|d| !records.iter().any(|r| r.sensor_id == d.id))
            .collect();
        if !unseen.is_empty() {
            println!("Not yet stored:");
            for definition in unseen {
                println!("  {:<24} {}", definition.id, definition.name);
            }
        }
    }

    async fn set_enabled(&self, sensor_id: &str, server: Option<u32>, enabled: bool) -> Result<()> {
        let ctx = self.context();
        let Some((manager, _)) = self.dispatcher.engine().registry().find(ctx, sensor_id) else {
            return Err(SyncError::UnknownSensor(sensor_id.to_string()));
        };
        if enabled {
            let missing = ctx.missing_permissions(&manager.required_permissions(sensor_id));
            if !missing.is_empty() {
                return Err(SyncError::Config(format!(
                    "{} needs permissions that are not granted: {}",
                    sensor_id,
                    missing.join(", ")
                )));
            }
        }

        let server_ids = match server {
            Some(id) if ctx.servers().get(id).is_none() => {
                return Err(SyncError::UnknownServer(id));
            }
            Some(id) => vec![id],
            None => ctx.servers().ids(),
        };
        let store = ctx.store();
        for server_id in server_ids {
            if !store.set_enabled(sensor_id, server_id, enabled)? {
                store.get_or_default(sensor_id, server_id, enabled)?;
            }
        }

        self.dispatcher
            .on_receive(Trigger::UpdateSensor(sensor_id.to_string()))
            .await;
        println!(
            "{} {}",
            sensor_id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let app = App::build(config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => app.run_daemon().await?,
        Commands::Update { sensor, event } => {
            let trigger = match (sensor, event) {
                (Some(sensor), _) => Trigger::UpdateSensor(sensor),
                (None, Some(event)) => event.into(),
                (None, None) => Trigger::UpdateAll,
            };
            app.update_once(trigger).await;
        }
        Commands::List => app.list(),
        Commands::Enable { sensor, server } => app.set_enabled(&sensor, server, true).await?,
        Commands::Disable { sensor, server } => app.set_enabled(&sensor, server, false).await?,
    }
    Ok(())
}

fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}", e);
        std::process::exit(1);
    }
}
