//! Beauty booking engine CLI server
//!
//! Headless booking service suitable for deployment as a systemd service,
//! Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/beauty-booking/config.toml)
//! booking-service
//!
//! # Custom config path
//! booking-service --config /etc/beauty-booking/config.toml
//!
//! # Validate config without starting
//! booking-service --check
//!
//! # Run every sweep once (cron style) and exit
//! booking-service --sweep-once
//!
//! # Redo the points side of a cancellation whose event handler failed
//! booking-service --reconcile 6f1c2a9e-0d4b-4c1e-9a57-2b8e3f0c7d11
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use beauty_booking::config::AppConfig;
use beauty_booking::server::{init_tracing, ServerHandle, ServerOptions};
use beauty_booking::shared::Clock;

/// Beauty booking engine: reservations, no-show sweeps and points.
#[derive(Parser, Debug)]
#[command(
    name = "booking-service",
    version,
    about = "Reservation engine for beauty-service shops",
    long_about = "Beauty booking engine: slot locking, reservation lifecycle, \
                  automatic no-show handling and the points ledger.\n\n\
                  Default config: ~/.config/beauty-booking/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "BOOKING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the database URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,

    /// Run the no-show and points sweeps once, then exit.
    #[arg(long)]
    sweep_once: bool,

    /// Restore the points of a cancelled reservation, then exit.
    #[arg(long, value_name = "RESERVATION_ID")]
    reconcile: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(beauty_booking::default_config_path);

    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(ref url) = cli.database_url {
        config.database.url = Some(url.clone());
    }

    init_tracing(&config);
    match load_error {
        None => info!("Configuration loaded from {}", config_path.display()),
        Some(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            if cli.check {
                return Err(e.into());
            }
            error!("Using default configuration.");
        }
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("Configuration is valid");
        println!("   Config file      : {}", config_path.display());
        println!("   Database         : {}", config.database.connection_url());
        println!("   Log level        : {}", config.logging.level);
        println!("   Lock timeout     : {}ms", config.booking.lock_timeout_ms);
        println!(
            "   Shop UTC offset  : {}",
            chrono::FixedOffset::east_opt(config.booking.utc_offset_minutes * 60)
                .map(|o| o.to_string())
                .unwrap_or_else(|| "invalid".to_string())
        );
        println!(
            "   No-show grace    : {}min",
            config.scheduler.no_show_grace_minutes
        );
        println!("   Sweeps enabled   : {}", config.scheduler.enabled);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
        background_tasks: !cli.sweep_once && cli.reconcile.is_none(),
    })
    .await?;

    if let Some(reservation_id) = cli.reconcile {
        let now = handle.engine.clock.now();
        let result = handle
            .engine
            .ledger
            .reconcile_cancelled(reservation_id, now)
            .await;
        handle.shutdown().await;
        println!("Reservation {}: restored {} points", reservation_id, result?);
        return Ok(());
    }

    if cli.sweep_once {
        let result = handle.engine.sweep_once().await;
        handle.shutdown().await;
        let (reservations, lots) = result?;
        println!(
            "Reservations: examined {}, transitioned {}, skipped {}, failed {}",
            reservations.examined, reservations.transitioned, reservations.skipped, reservations.failed
        );
        println!("Points lots: activated {}, expired {}", lots.activated, lots.expired);
        return Ok(());
    }

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
