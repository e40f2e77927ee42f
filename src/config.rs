//! Configuration module
//!
//! Loaded from a TOML file (default `~/.config/beauty-booking/config.toml`).
//! Every section and field has a default, so a partial or missing file is
//! fine.

use std::path::{Path, PathBuf};

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::points::EarningPolicy;
use crate::shared::errors::InfraError;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beauty-booking")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub logging: LoggingConfig,
    pub booking: BookingConfig,
    pub scheduler: SchedulerConfig,
    pub points: PointsConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, InfraError> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Full connection URL; wins over `path` when set
    pub url: Option<String>,
    /// SQLite file used when no URL is given
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            path: "./booking.db".to_string(),
            max_connections: 10,
            connect_timeout_secs: 8,
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}?mode=rwc", self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Bounded wait for a slot lock
    pub lock_timeout_ms: u64,
    /// Offset of shop-local time from UTC (540 = Asia/Seoul)
    pub utc_offset_minutes: i32,
    /// How far ahead a slot may be booked
    pub max_advance_days: i64,
    /// Customer cancellations at least this long before the slot get the
    /// deposit back
    pub free_cancellation_hours: i64,
    /// Window after completion in which a review can be written
    pub review_window_days: i64,
    /// Value of one point in currency units
    pub point_value: i64,
    /// Attempts for deposit capture / refund calls
    pub payment_max_attempts: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            utc_offset_minutes: 540,
            max_advance_days: 90,
            free_cancellation_hours: 24,
            review_window_days: 7,
            point_value: 1,
            payment_max_attempts: 3,
        }
    }
}

impl BookingConfig {
    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }

    /// Shop-local offset; out-of-range values fall back to UTC.
    pub fn shop_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub no_show_interval_secs: u64,
    /// Minutes after the slot start before a confirmed reservation is a no-show
    pub no_show_grace_minutes: i64,
    /// Cancel requested reservations that are still unconfirmed at start
    pub cancel_unconfirmed: bool,
    /// Complete in-progress reservations this long after their end; 0 disables
    pub auto_complete_after_minutes: i64,
    pub lot_sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            no_show_interval_secs: 120,
            no_show_grace_minutes: 15,
            cancel_unconfirmed: true,
            auto_complete_after_minutes: 120,
            lot_sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub earn_rate_bps: i64,
    pub max_earn_per_reservation: i64,
    pub hold_days: i64,
    pub validity_days: i64,
    /// Validity of lots created when a refund cannot go back to an expired lot
    pub refund_adjustment_validity_days: i64,
    /// Look-ahead for the "expiring soon" balance figure
    pub expiring_soon_days: i64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            earn_rate_bps: 250,
            max_earn_per_reservation: 0,
            hold_days: 7,
            validity_days: 365,
            refund_adjustment_validity_days: 30,
            expiring_soon_days: 30,
        }
    }
}

impl PointsConfig {
    pub fn earning_policy(&self) -> EarningPolicy {
        EarningPolicy {
            earn_rate_bps: self.earn_rate_bps,
            max_earn_per_reservation: self.max_earn_per_reservation,
            hold: Duration::days(self.hold_days),
            validity: Duration::days(self.validity_days),
        }
    }

    pub fn refund_adjustment_validity(&self) -> Duration {
        Duration::days(self.refund_adjustment_validity_days)
    }

    pub fn expiring_soon_window(&self) -> Duration {
        Duration::days(self.expiring_soon_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape listener
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9464".to_string(),
        }
    }
}
