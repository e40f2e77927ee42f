//! Reusable booking engine runtime.
//!
//! [`BookingEngine`] wires repositories, the points ledger, the reservation
//! state machine, the orchestrator and the sweeps together. [`ServerHandle`]
//! adds the process lifecycle around it: database init, migrations,
//! metrics, background tasks and graceful shutdown.
//!
//! The CLI binary and the integration tests share this so the assembly
//! order (ledger registered as an event handler before the state machine
//! is built) lives in one place.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{create_event_bus, EventDispatcher, SharedEventBus};
use crate::application::ports::{
    spawn_notification_forwarder, DeferredPaymentGateway, LogNotificationSink, PaymentGateway,
};
use crate::application::services::{LotSweepReport, LotSweeper, NoShowScheduler, SweepReport};
use crate::application::{BookingOrchestrator, PointsLedger, ReservationStateMachine};
use crate::config::{AppConfig, MetricsConfig};
use crate::domain::{DomainResult, RepositoryProvider};
use crate::infrastructure::database::{init_database, run_migrations, DatabaseConfig};
use crate::infrastructure::SeaOrmRepositoryProvider;
use crate::shared::clock::{SharedClock, SystemClock};
use crate::shared::errors::InfraError;
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── BookingEngine ──────────────────────────────────────────────────

/// Every long-lived component of the booking engine, wired together.
#[derive(Clone)]
pub struct BookingEngine {
    pub repos: Arc<dyn RepositoryProvider>,
    pub event_bus: SharedEventBus,
    pub clock: SharedClock,
    pub ledger: Arc<PointsLedger>,
    pub state_machine: Arc<ReservationStateMachine>,
    pub orchestrator: Arc<BookingOrchestrator>,
    pub no_show: Arc<NoShowScheduler>,
    pub lot_sweeper: Arc<LotSweeper>,
    config: AppConfig,
}

impl BookingEngine {
    pub fn assemble(
        repos: Arc<dyn RepositoryProvider>,
        clock: SharedClock,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let event_bus = create_event_bus();

        let ledger = Arc::new(PointsLedger::new(
            repos.clone(),
            event_bus.clone(),
            clock.clone(),
            config.points.clone(),
            config.booking.lock_timeout(),
        ));

        let dispatcher = EventDispatcher::new(event_bus.clone()).with_handler(ledger.clone());

        let state_machine = Arc::new(ReservationStateMachine::new(
            repos.clone(),
            dispatcher,
            clock.clone(),
            config.booking.clone(),
            ledger.earning_policy().clone(),
        ));

        let orchestrator = Arc::new(BookingOrchestrator::new(
            repos.clone(),
            state_machine.clone(),
            ledger.clone(),
            gateway,
            clock.clone(),
            config.booking.clone(),
        ));

        let no_show = Arc::new(NoShowScheduler::new(
            repos.clone(),
            state_machine.clone(),
            clock.clone(),
            config.scheduler.clone(),
            config.booking.shop_offset(),
        ));

        let lot_sweeper = Arc::new(LotSweeper::new(
            ledger.clone(),
            clock.clone(),
            Duration::from_secs(config.scheduler.lot_sweep_interval_secs),
        ));

        Self {
            repos,
            event_bus,
            clock,
            ledger,
            state_machine,
            orchestrator,
            no_show,
            lot_sweeper,
            config: config.clone(),
        }
    }

    /// Run every sweep once at the current clock reading.
    pub async fn sweep_once(&self) -> DomainResult<(SweepReport, LotSweepReport)> {
        let now = self.clock.now();
        let reservations = self.no_show.sweep_once(now).await?;
        let lots = self.lot_sweeper.sweep_once(now).await?;
        Ok((reservations, lots))
    }

    /// Spawn the periodic sweeps. Nothing is started when the scheduler is
    /// disabled in config.
    pub fn start_background(&self, shutdown: ShutdownSignal) -> Vec<JoinHandle<()>> {
        if !self.config.scheduler.enabled {
            info!("Background sweeps disabled by configuration");
            return Vec::new();
        }
        vec![
            self.no_show.clone().start(shutdown.clone()),
            self.lot_sweeper.clone().start(shutdown),
        ]
    }
}

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the booking service.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
    /// Start periodic sweeps and the notification forwarder (default: true).
    pub background_tasks: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
            background_tasks: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running booking service.
///
/// # Examples
///
/// ```rust,no_run
/// use beauty_booking::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub engine: BookingEngine,
    /// The configuration the server was started with.
    pub config: AppConfig,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Start the booking service with the given options.
    ///
    /// This will:
    /// 1. Install the Prometheus exporter (when enabled)
    /// 2. Connect to the database and run migrations
    /// 3. Assemble the booking engine
    /// 4. Start the no-show and lot sweeps and the notification forwarder
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;

        info!("Starting beauty booking service...");

        install_metrics(&app_cfg.metrics)?;

        // ── Database ───────────────────────────────────────────
        let db_config = DatabaseConfig::from(&app_cfg.database);
        let db = init_database(&db_config).await?;

        if opts.auto_migrate {
            run_migrations(&db).await?;
        }

        // ── Engine ─────────────────────────────────────────────
        let repos: Arc<dyn RepositoryProvider> =
            Arc::new(SeaOrmRepositoryProvider::new(db.clone()));
        let clock: SharedClock = Arc::new(SystemClock);
        let engine = BookingEngine::assemble(
            repos,
            clock,
            Arc::new(DeferredPaymentGateway),
            &app_cfg,
        );
        info!(
            lock_timeout_ms = app_cfg.booking.lock_timeout_ms,
            utc_offset_minutes = app_cfg.booking.utc_offset_minutes,
            "Booking engine assembled"
        );

        // ── Shutdown coordinator ───────────────────────────────
        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);

        // ── Background tasks ───────────────────────────────────
        let mut tasks = Vec::new();
        if opts.background_tasks {
            tasks.extend(engine.start_background(shutdown.signal()));
            tasks.push(spawn_notification_forwarder(
                engine.event_bus.clone(),
                Arc::new(LogNotificationSink),
                shutdown.signal(),
            ));
        }

        info!(tasks = tasks.len(), "Booking service started");

        Ok(Self {
            engine,
            config: app_cfg,
            db,
            shutdown,
            tasks,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the service to stop after shutdown has been triggered.
    /// Background tasks get `server.shutdown_timeout` seconds to finish.
    pub async fn wait(self) {
        let Self {
            shutdown, tasks, db, ..
        } = self;

        let finished = shutdown
            .shutdown_with_cleanup(|| async move {
                for task in tasks {
                    if let Err(e) = task.await {
                        error!(error = %e, "Background task panicked");
                    }
                }
            })
            .await;
        if !finished {
            warn!("Some background tasks did not stop in time");
        }

        if let Err(e) = db.close().await {
            warn!(error = %e, "Error closing database connection");
        } else {
            info!("Database connection closed");
        }

        info!("Beauty booking service shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("Shutting down beauty booking service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Whether any background task is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Install the Prometheus recorder and scrape listener.
///
/// The global recorder can only be installed once per process; later calls
/// (a restart within the same process) are no-ops.
fn install_metrics(config: &MetricsConfig) -> Result<(), InfraError> {
    static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

    if !config.enabled {
        return Ok(());
    }
    if let Some(addr) = INSTALLED.get() {
        info!(%addr, "Prometheus exporter already running");
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| InfraError::Metrics(format!("invalid listen address '{}': {}", config.listen, e)))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| InfraError::Metrics(e.to_string()))?;

    let _ = INSTALLED.set(addr);
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
