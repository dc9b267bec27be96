//! bluewire - BLE sniffer capture daemon
//!
//! Reads the UART capture stream from a radio sniffer and decodes it into
//! structured link-layer packet records, printed as text or NDJSON.

use bluewire_capture::{CaptureConfig, CaptureRecord, FollowConfig, SerialTransport, Sniffer};
use bluewire_protocol::{DeviceAddress, FollowFilter};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bluewire")]
#[command(about = "BLE sniffer capture daemon")]
#[command(version)]
struct Cli {
    /// Serial device path
    #[arg(short, long, env = "BLUEWIRE_DEVICE")]
    device: Option<String>,

    /// Baud rate
    #[arg(short, long, env = "BLUEWIRE_BAUD")]
    baud: Option<u32>,

    /// YAML config file
    #[arg(short, long, env = "BLUEWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Device address to follow once seen (XX:XX:XX:XX:XX:XX)
    #[arg(short, long)]
    follow: Option<DeviceAddress>,

    /// Only forward advertising traffic while following
    #[arg(long)]
    adv_only: bool,

    /// Only follow legacy advertising
    #[arg(long)]
    legacy_only: bool,

    /// Only follow coded-PHY advertising
    #[arg(long)]
    coded_only: bool,

    /// Emit NDJSON records instead of human-readable lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration (explicit file, or BLUEWIRE_CONFIG + env overrides)
    let mut config = match cli.config {
        Some(ref path) => {
            let mut config = CaptureConfig::from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => CaptureConfig::load()?,
    };

    // CLI flags win over file and environment
    if let Some(device) = cli.device {
        config.transport.device = device;
    }
    if let Some(baud) = cli.baud {
        config.transport.baud = baud;
    }
    if let Some(address) = cli.follow {
        config.follow = Some(FollowConfig {
            address,
            filter: FollowFilter {
                advertisements_only: cli.adv_only,
                legacy_only: cli.legacy_only,
                coded_only: cli.coded_only,
            },
        });
    } else if let Some(ref mut follow) = config.follow {
        follow.filter.advertisements_only |= cli.adv_only;
        follow.filter.legacy_only |= cli.legacy_only;
        follow.filter.coded_only |= cli.coded_only;
    }

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting bluewire capture");
    tracing::info!(
        "  Device: {} @ {} baud",
        config.transport.device,
        config.transport.baud
    );
    match config.follow {
        Some(ref follow) => tracing::info!("  Follow target: {}", follow.address),
        None => tracing::info!("  Follow target: none"),
    }
    tracing::info!("  Output: {}", if cli.json { "ndjson" } else { "text" });

    let transport = SerialTransport::open(
        &config.transport.device,
        config.transport.baud,
        config.transport.read_timeout(),
    )?;

    // Cooperative shutdown: the loop checks the flag between frames.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping capture...");
            stop.store(true, Ordering::Relaxed);
        });
    }

    // The capture loop is synchronous by design; run it off the runtime.
    let json = cli.json;
    let stats = tokio::task::spawn_blocking(move || {
        let mut sniffer = Sniffer::new(transport, &config, stop);
        sniffer.run(move |record| print_record(&record, json))
    })
    .await??;

    tracing::info!(
        frames = stats.frames,
        packets = stats.packets,
        diagnostics = stats.diagnostics,
        dropped = stats.dropped,
        timeouts = stats.timeouts,
        "Capture stopped"
    );
    Ok(())
}

fn print_record(record: &CaptureRecord, json: bool) {
    if json {
        match serde_json::to_string(record) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!(%err, "record serialization failed"),
        }
        return;
    }

    let line = record.to_string();
    if record.event == "diagnostic" {
        println!("{}", line.dimmed());
    } else if record.radio.as_ref().is_some_and(|radio| radio.ok) {
        println!("{line}");
    } else {
        println!("{}", line.red());
    }
}
