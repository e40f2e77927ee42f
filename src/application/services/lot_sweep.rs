//! Points lot lifecycle sweep
//!
//! Activates lots whose hold has ended and expires lots past validity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::application::points::PointsLedger;
use crate::domain::DomainResult;
use crate::shared::clock::SharedClock;
use crate::shared::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LotSweepReport {
    pub activated: usize,
    pub expired: usize,
}

pub struct LotSweeper {
    ledger: Arc<PointsLedger>,
    clock: SharedClock,
    interval: Duration,
}

impl LotSweeper {
    pub fn new(ledger: Arc<PointsLedger>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            ledger,
            clock,
            interval,
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> DomainResult<LotSweepReport> {
        // Expire first so a lot past both deadlines never flickers active.
        let expired = self.ledger.expire_due_lots(now).await?;
        let activated = self.ledger.activate_due_lots(now).await?;

        let report = LotSweepReport { activated, expired };
        if activated > 0 || expired > 0 {
            info!(activated, expired, "Points lot sweep finished");
        } else {
            debug!("Points lot sweep found nothing to do");
        }
        Ok(report)
    }

    pub fn start(self: Arc<Self>, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Points lot sweeper started");
            let mut interval = tokio::time::interval(self.interval.max(Duration::from_secs(1)));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once(self.clock.now()).await {
                            warn!(error = %e, "Points lot sweep error");
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        break;
                    }
                }
            }
            info!("Points lot sweeper stopped");
        })
    }
}
