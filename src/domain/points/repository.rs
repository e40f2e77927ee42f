//! Points ledger repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{LotStatus, PointsLot, PointsUsage};
use crate::domain::DomainResult;

#[async_trait]
pub trait PointsRepository: Send + Sync {
    async fn insert_lot(&self, lot: PointsLot) -> DomainResult<()>;

    async fn find_lot(&self, id: Uuid) -> DomainResult<Option<PointsLot>>;

    /// All lots of a user, any status, oldest issue first
    async fn find_lots_for_user(&self, user_id: Uuid) -> DomainResult<Vec<PointsLot>>;

    /// Lots earned by a reservation
    async fn find_lots_for_reservation(&self, reservation_id: Uuid)
        -> DomainResult<Vec<PointsLot>>;

    /// Write drawn lots and the usage record as one unit.
    ///
    /// Each lot is written only if its stored version still equals
    /// `lot.version`; the stored version becomes `lot.version + 1`. Any
    /// mismatch aborts the whole unit with `ConcurrentModification`.
    async fn record_usage(&self, lots: Vec<PointsLot>, usage: PointsUsage) -> DomainResult<()>;

    async fn find_usage(&self, id: Uuid) -> DomainResult<Option<PointsUsage>>;

    /// Write re-credited lots, an optional adjustment lot, and the usage
    /// (with `reversed_at` set) as one unit. Version rules as in
    /// [`record_usage`](Self::record_usage); the usage must not already be
    /// reversed in storage.
    async fn record_reversal(
        &self,
        lots: Vec<PointsLot>,
        adjustment: Option<PointsLot>,
        usage: PointsUsage,
    ) -> DomainResult<()>;

    /// Compare-and-set a lot status. Returns `false` when the lot is no
    /// longer in `from`.
    async fn transition_lot(
        &self,
        id: Uuid,
        from: LotStatus,
        to: LotStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Pending lots whose hold ended at or before `now` and that have not
    /// expired
    async fn find_lot_ids_due_for_activation(&self, now: DateTime<Utc>) -> DomainResult<Vec<Uuid>>;

    /// Pending or active lots with `expires_at <= now`
    async fn find_lots_due_for_expiry(&self, now: DateTime<Utc>) -> DomainResult<Vec<PointsLot>>;
}
