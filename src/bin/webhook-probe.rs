//! Development tool that checks a server's mobile app webhook.
//!
//! Fetches the server config and prints the version and the per-sensor
//! disabled flags the sync engine would see.
//!
//! Usage:
//!   cargo run --bin webhook-probe -- --server 1
//!   cargo run --bin webhook-probe -- --url http://ha.local:8123 --webhook-id abc123

use clap::Parser;
use companion_sensor_sync::config::{self, Config, ServerSettings};
use companion_sensor_sync::integration::{CoreVersion, IntegrationClient, WebhookClient};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "webhook-probe")]
#[command(about = "Fetch and print a server's config through its mobile app webhook")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "SENSOR_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Configured server id to probe
    #[arg(long, default_value_t = 1)]
    server: u32,

    /// Probe this URL instead of a configured server
    #[arg(long, requires = "webhook_id")]
    url: Option<String>,

    /// Webhook id to use with --url
    #[arg(long)]
    webhook_id: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

fn resolve_server(cli: &Cli) -> Result<ServerSettings, Box<dyn std::error::Error>> {
    if let (Some(url), Some(webhook_id)) = (&cli.url, &cli.webhook_id) {
        return Ok(ServerSettings {
            id: 0,
            name: "probe".to_string(),
            url: url.clone(),
            webhook_id: webhook_id.clone(),
            trusted: false,
        });
    }
    let config = Config::load(cli.config.as_deref())?;
    config
        .servers
        .into_iter()
        .find(|s| s.id == cli.server)
        .ok_or_else(|| format!("Server {} is not configured", cli.server).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let settings = resolve_server(&cli)?;

    println!("Probing {} at {}...", settings.name, settings.url);
    let client = WebhookClient::new(&settings, Duration::from_secs(cli.timeout))?;

    let remote = match client.get_config().await {
        Ok(remote) => remote,
        Err(e) => {
            eprintln!("Failed to fetch config: {}", e);
            if e.is_connectivity() {
                eprintln!("Make sure the server is running and reachable.");
            }
            std::process::exit(1);
        }
    };

    match CoreVersion::parse(&remote.version) {
        Some(version) => {
            println!("Version: {}", version);
            println!(
                "Disabled sensor sync: {}",
                if version.supports_disabled_sensors() {
                    "supported"
                } else {
                    "not supported"
                }
            );
        }
        None => println!("Version: {} (unparseable)", remote.version),
    }

    let mut entities: Vec<_> = remote.entities.into_iter().collect();
    entities.sort_by(|a, b| a.0.cmp(&b.0));
    println!("Entities: {}", entities.len());
    for (id, status) in entities {
        let state = match status.disabled {
            Some(true) => "disabled",
            Some(false) => "enabled",
            None => "unknown",
        };
        println!("  {:<32} {}", id, state);
    }
    Ok(())
}
