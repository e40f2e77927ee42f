//! Reservation repository interface

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::model::{Reservation, ReservationStatus};
use super::transition::StateTransition;
use crate::domain::DomainResult;

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a new reservation together with its creation audit row,
    /// atomically.
    async fn insert(&self, reservation: Reservation, created: StateTransition) -> DomainResult<()>;

    /// Find reservation by ID
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>>;

    /// Persist a transitioned reservation and its audit row atomically.
    ///
    /// Fails with `ConcurrentModification` (and writes nothing) when the
    /// stored version is no longer `expected_version`.
    async fn apply_transition(
        &self,
        reservation: Reservation,
        expected_version: i64,
        transition: StateTransition,
    ) -> DomainResult<()>;

    /// Reservations occupying capacity (requested, confirmed, in progress)
    /// for a shop on a date.
    async fn find_active_for_shop_on_date(
        &self,
        shop_id: Uuid,
        date: NaiveDate,
    ) -> DomainResult<Vec<Reservation>>;

    /// Reservations in `status` whose shop-local start is strictly before
    /// `cutoff`.
    async fn find_by_status_starting_before(
        &self,
        status: ReservationStatus,
        cutoff: NaiveDateTime,
    ) -> DomainResult<Vec<Reservation>>;

    /// All reservations for a customer, newest slot first
    async fn find_for_customer(&self, customer_id: Uuid) -> DomainResult<Vec<Reservation>>;

    /// Audit rows for a reservation, oldest first
    async fn transitions_for(&self, reservation_id: Uuid) -> DomainResult<Vec<StateTransition>>;
}
