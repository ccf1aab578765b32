use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use streetlight_bridge::config::Config;
use streetlight_bridge::frame::{ClockTimestamp, SlotSpec};
use streetlight_bridge::{build_dispatcher, Action, DispatchReport, Dispatcher};

#[derive(Parser)]
#[command(name = "streetlight-bridge")]
#[command(about = "Send streetlight commands from ThingsBoard assets to ChirpStack device queues")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP command surface
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Turn every light of an asset on or off
    Light {
        asset_id: String,
        /// "on", "off", "Light On" or "Light Off"
        state: String,
    },
    /// Set the controller clocks of an asset
    TimeSync {
        asset_id: String,
        /// "<Weekday> <YYYY-MM-DD> <HH:MM:SS>", local time if omitted
        timestamp: Option<String>,
    },
    /// Program the two dimming slots of an asset
    Schedule {
        asset_id: String,
        slot1_time: String,
        slot1_dim: i64,
        slot2_time: String,
        slot2_dim: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.apply_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("streetlight-bridge v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;
    info!("ThingsBoard: {}", config.thingsboard.url);
    info!("ChirpStack:  {}", config.chirpstack.url);

    let dispatcher = build_dispatcher(&config)?;

    match cli.command {
        Command::Serve { bind } => serve(&config, bind, dispatcher).await,
        Command::Light { asset_id, state } => {
            let action = Action::turn_light(&state)?;
            run_once(&dispatcher, &asset_id, action).await
        }
        Command::TimeSync {
            asset_id,
            timestamp,
        } => {
            let action = match timestamp {
                Some(text) => Action::time_sync(&text)?,
                None => Action::TimeSync(ClockTimestamp::from_datetime(&chrono::Local::now())),
            };
            run_once(&dispatcher, &asset_id, action).await
        }
        Command::Schedule {
            asset_id,
            slot1_time,
            slot1_dim,
            slot2_time,
            slot2_dim,
        } => {
            let slot1 = SlotSpec {
                time: Some(slot1_time),
                dim_level: Some(slot1_dim),
            };
            let slot2 = SlotSpec {
                time: Some(slot2_time),
                dim_level: Some(slot2_dim),
            };
            let action = Action::schedule(Some(&slot1), Some(&slot2))?;
            run_once(&dispatcher, &asset_id, action).await
        }
    }
}

/// Dispatch one action; Ctrl+C stops before the next device
async fn run_once(dispatcher: &Dispatcher, asset_id: &str, action: Action) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current device and stopping");
            let _ = stop_tx.send(true);
        }
    });

    let report = dispatcher.dispatch_until(asset_id, &action, stop_rx).await?;
    print_report(&report)?;

    if report.failed() > 0 {
        error!("{} device(s) did not receive the command", report.failed());
    }
    Ok(())
}

fn print_report(report: &DispatchReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(
    config: &Config,
    bind: Option<SocketAddr>,
    dispatcher: Dispatcher,
) -> anyhow::Result<()> {
    let bind = match bind {
        Some(addr) => addr,
        None => config
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind {:?}", config.server.bind))?,
    };

    info!("Pacing between devices: {:?}", dispatcher.pacing());
    info!("Bridge running. Press Ctrl+C to stop.");
    streetlight_bridge::api::start_server(bind, std::sync::Arc::new(dispatcher), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down...");
    })
    .await
}

#[cfg(not(feature = "server"))]
async fn serve(
    _config: &Config,
    _bind: Option<SocketAddr>,
    _dispatcher: Dispatcher,
) -> anyhow::Result<()> {
    anyhow::bail!("built without the `server` feature; rebuild with --features server")
}
