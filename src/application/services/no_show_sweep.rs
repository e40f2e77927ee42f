//! No-show and auto-progression scheduler
//!
//! Periodically drives overdue reservations forward through the state
//! machine:
//! - confirmed, past start + grace → no-show
//! - requested, past start → cancelled by shop (confirmation timeout)
//! - in progress, past end + auto-complete delay → completed
//!
//! Each sweep works from a snapshot of candidate ids taken at its start.
//! Rows another actor moved in the meantime fail allow-list validation
//! and are counted as skipped, so overlapping or repeated sweeps are
//! harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::booking::state_machine::{ReservationStateMachine, TransitionContext};
use crate::config::SchedulerConfig;
use crate::domain::{
    Actor, CancellationReason, DomainError, DomainResult, RepositoryProvider, ReservationStatus,
};
use crate::shared::clock::{to_local, SharedClock};
use crate::shared::shutdown::ShutdownSignal;

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub transitioned: usize,
    /// Already moved by someone else
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.examined += other.examined;
        self.transitioned += other.transitioned;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

pub struct NoShowScheduler {
    repos: Arc<dyn RepositoryProvider>,
    state_machine: Arc<ReservationStateMachine>,
    clock: SharedClock,
    config: SchedulerConfig,
    offset: FixedOffset,
    running: Arc<RwLock<bool>>,
}

impl NoShowScheduler {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        state_machine: Arc<ReservationStateMachine>,
        clock: SharedClock,
        config: SchedulerConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            repos,
            state_machine,
            clock,
            config,
            offset,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// One bounded pass over every overdue category.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> DomainResult<SweepReport> {
        let mut report = SweepReport::default();

        let grace = ChronoDuration::minutes(self.config.no_show_grace_minutes);
        let overdue = self
            .snapshot(ReservationStatus::Confirmed, now - grace, |_| true)
            .await?;
        report.merge(
            self.drive(
                overdue,
                ReservationStatus::NoShow,
                TransitionContext::new().with_note("no-show sweep"),
                "no_show",
            )
            .await,
        );

        if self.config.cancel_unconfirmed {
            let unconfirmed = self
                .snapshot(ReservationStatus::Requested, now, |_| true)
                .await?;
            report.merge(
                self.drive(
                    unconfirmed,
                    ReservationStatus::CancelledByShop,
                    TransitionContext::new().with_reason(CancellationReason::ConfirmationTimeout),
                    "confirmation_timeout",
                )
                .await,
            );
        }

        if self.config.auto_complete_after_minutes > 0 {
            let after = ChronoDuration::minutes(self.config.auto_complete_after_minutes);
            let local_cutoff = to_local(now - after, self.offset);
            let lingering = self
                .snapshot(ReservationStatus::InProgress, now - after, |r| {
                    r.ends_at() < local_cutoff
                })
                .await?;
            report.merge(
                self.drive(
                    lingering,
                    ReservationStatus::Completed,
                    TransitionContext::new().with_note("auto-complete sweep"),
                    "auto_complete",
                )
                .await,
            );
        }

        if report.transitioned > 0 || report.failed > 0 {
            info!(
                examined = report.examined,
                transitioned = report.transitioned,
                skipped = report.skipped,
                failed = report.failed,
                "Reservation sweep finished"
            );
        } else {
            debug!(examined = report.examined, "Reservation sweep found nothing to do");
        }
        Ok(report)
    }

    /// Ids of reservations in `status` starting before `cutoff` (UTC) that
    /// pass `keep`.
    async fn snapshot(
        &self,
        status: ReservationStatus,
        cutoff: DateTime<Utc>,
        keep: impl Fn(&crate::domain::Reservation) -> bool,
    ) -> DomainResult<Vec<Uuid>> {
        let candidates = self
            .repos
            .reservations()
            .find_by_status_starting_before(status, to_local(cutoff, self.offset))
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|r| keep(r))
            .map(|r| r.id)
            .collect())
    }

    async fn drive(
        &self,
        ids: Vec<Uuid>,
        to: ReservationStatus,
        ctx: TransitionContext,
        kind: &'static str,
    ) -> SweepReport {
        let mut report = SweepReport {
            examined: ids.len(),
            ..SweepReport::default()
        };

        for id in ids {
            match self
                .state_machine
                .transition(id, to, Actor::System, ctx.clone())
                .await
            {
                Ok(_) => {
                    report.transitioned += 1;
                    metrics::counter!("booking_sweep_transitions_total", "kind" => kind)
                        .increment(1);
                }
                Err(DomainError::InvalidStateTransition { from, .. }) => {
                    debug!(reservation_id = %id, %from, kind, "Already moved, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(reservation_id = %id, kind, error = %e, "Sweep transition failed");
                    metrics::counter!("booking_sweep_failures_total", "kind" => kind).increment(1);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Start the sweep loop in the background
    pub fn start(self: Arc<Self>, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            *self.running.write().await = true;
            info!(
                interval_secs = self.config.no_show_interval_secs,
                grace_minutes = self.config.no_show_grace_minutes,
                "No-show scheduler started"
            );

            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.no_show_interval_secs.max(1)));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once(self.clock.now()).await {
                            warn!(error = %e, "No-show sweep error");
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        info!("No-show scheduler shutting down");
                        break;
                    }
                }
            }

            *self.running.write().await = false;
            info!("No-show scheduler stopped");
        })
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_merge_by_sum() {
        let mut total = SweepReport {
            examined: 2,
            transitioned: 1,
            skipped: 1,
            failed: 0,
        };
        total.merge(SweepReport {
            examined: 3,
            transitioned: 2,
            skipped: 0,
            failed: 1,
        });
        assert_eq!(
            total,
            SweepReport {
                examined: 5,
                transitioned: 3,
                skipped: 1,
                failed: 1
            }
        );
    }
}
