// blelink-cli: drive central and peripheral sessions from the terminal
//
// Runs both roles in-process over the loopback radio.

mod config;
mod render;

use anyhow::{Context, Result};
use blelink_core::{
    CentralSession, LoopbackAir, PeripheralRadio, PeripheralSession, ServiceIdentity,
    SessionStatus,
};
use clap::{Parser, Subcommand};
use colored::*;
use render::Printer;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

const DEFAULT_MESSAGE: &str = "Hello beloved central!";

#[derive(Parser)]
#[command(name = "blelink")]
#[command(about = "blelink: one-to-one BLE data link", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Advertise, discover, connect and push one message over the loopback radio
    Demo {
        #[arg(short, long, default_value = DEFAULT_MESSAGE)]
        message: String,
        /// Give up after this many seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,
        /// Print statuses as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Run the scan duty cycle with no matching peripheral around
    Scan {
        /// Number of scan/wait cycles to run
        #[arg(short, long, default_value = "3")]
        cycles: usize,
        /// Put a peripheral advertising some other service on the air
        #[arg(long)]
        advertise_other: bool,
        #[arg(long)]
        json: bool,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Path,
    Get { key: String },
    Set { key: String, value: String },
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Demo {
            message,
            timeout,
            json,
        } => cmd_demo(message, timeout, json).await,
        Commands::Scan {
            cycles,
            advertise_other,
            json,
        } => cmd_scan(cycles, advertise_other, json).await,
        Commands::Config { action } => cmd_config(action),
    }
}

/// Logs go to stderr, or to `log_file` when given. The guard must live until
/// exit so buffered lines reach the file.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn cmd_demo(message: String, timeout_secs: u64, json: bool) -> Result<()> {
    let config = config::Config::load()?;
    let identity = config.identity()?;
    let printer = Printer::new(json);

    if !printer.is_json() {
        println!("{}", "blelink demo".bold());
        println!("  Service:        {}", identity.service.to_string().bright_cyan());
        println!(
            "  Characteristic: {}",
            identity.characteristic.to_string().bright_cyan()
        );
        println!();
    }

    let air = LoopbackAir::new();
    let (peripheral, mut peripheral_status) =
        PeripheralSession::spawn(air.peripheral_radio(), config.peripheral_config());
    let (central, mut central_status) =
        CentralSession::spawn(air.central_radio(), config.central_config())
            .context("Invalid central settings")?;

    peripheral
        .start_advertising(identity)
        .await
        .context("Failed to start advertising")?;
    central.configure(identity).await.context("Failed to configure central")?;
    central
        .begin_scanning()
        .await
        .context("Failed to start scanning")?;

    let exchange = async {
        let mut received = None;
        loop {
            tokio::select! {
                Some(status) = central_status.recv() => {
                    printer.status("central", &status);
                    match status {
                        SessionStatus::PeersFound(peers) => {
                            if let Some(peer) = peers.first() {
                                central.connect(peer.handle).await?;
                            }
                        }
                        SessionStatus::DataReceived(data) => {
                            received = Some(data);
                            central.stop().await?;
                        }
                        SessionStatus::Failed(kind) => {
                            anyhow::bail!("Central failed: {}", kind);
                        }
                        SessionStatus::Stopped => break,
                        _ => {}
                    }
                }
                Some(status) = peripheral_status.recv() => {
                    printer.status("peripheral", &status);
                    match status {
                        SessionStatus::Connected => peripheral.send(message.as_bytes()).await?,
                        SessionStatus::Failed(kind) => {
                            anyhow::bail!("Peripheral failed: {}", kind);
                        }
                        _ => {}
                    }
                }
                else => break,
            }
        }
        Ok::<_, anyhow::Error>(received)
    };

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), exchange).await;
    let received = match outcome {
        Ok(result) => result?,
        Err(_) => {
            printer.summary("demo", false, &format!("No exchange within {}s", timeout_secs));
            anyhow::bail!("Demo timed out after {}s", timeout_secs);
        }
    };

    peripheral.disconnect().await?;
    peripheral.snapshot().await?;
    while let Some(status) = peripheral_status.try_recv() {
        printer.status("peripheral", &status);
    }

    match received {
        Some(data) if data == message.as_bytes() => {
            printer.summary(
                "demo",
                true,
                &format!("Central received {} bytes: {:?}", data.len(), message),
            );
            Ok(())
        }
        Some(data) => {
            printer.summary("demo", false, "Central received unexpected data");
            anyhow::bail!("Expected {:?}, got {} other bytes", message, data.len())
        }
        None => {
            printer.summary("demo", false, "Central received nothing");
            anyhow::bail!("Central stopped before any data arrived")
        }
    }
}

async fn cmd_scan(cycles: usize, advertise_other: bool, json: bool) -> Result<()> {
    let config = config::Config::load()?;
    let identity = config.identity()?;
    let printer = Printer::new(json);
    let duty_cycle = config.duty_cycle;

    if !printer.is_json() {
        println!("{}", "blelink scan".bold());
        println!(
            "  Duty cycle: {}ms scan / {}ms wait ({}% scanning)",
            duty_cycle.scan_duration_ms,
            duty_cycle.wait_delay_ms,
            duty_cycle.duty_percent()
        );
        println!(
            "  Looking for: {}",
            identity.service.to_string().bright_cyan()
        );
        println!();
    }

    let air = LoopbackAir::new();
    let _stranger = if advertise_other {
        let radio = air.peripheral_radio();
        let other = ServiceIdentity::new(Uuid::new_v4(), Uuid::new_v4())?;
        radio
            .start_advertising(&other, Some("stranger"))
            .await
            .context("Failed to advertise the other service")?;
        if !printer.is_json() {
            println!(
                "  {} Other service on air: {}",
                "•".dimmed(),
                other.service.to_string().dimmed()
            );
            println!();
        }
        Some(radio)
    } else {
        None
    };

    let (central, mut status) = CentralSession::spawn(air.central_radio(), config.central_config())
        .context("Invalid central settings")?;
    central.configure(identity).await?;
    central.begin_scanning().await?;

    let mut waits = 0;
    while let Some(next) = status.recv().await {
        printer.status("central", &next);
        match next {
            SessionStatus::Waiting => {
                waits += 1;
                if waits >= cycles {
                    break;
                }
            }
            SessionStatus::PeersFound(_) | SessionStatus::Stopped => break,
            _ => {}
        }
    }

    central.stop().await?;
    central.snapshot().await?;
    while let Some(next) = status.try_recv() {
        printer.status("central", &next);
    }

    printer.summary(
        "scan",
        true,
        &format!("Completed {} scan window(s) without a match", waits),
    );
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config::Config::load()?;
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }

        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Reset => {
            config::Config::default().save()?;
            println!("{} Configuration reset to defaults", "✓".green());
        }
    }

    Ok(())
}
