//! In-memory repositories for development and testing
//!
//! DashMap tables per aggregate. Multi-row units (reservation + audit row,
//! lots + usage record) take a short write gate so a unit is applied
//! entirely or not at all, mirroring the database transaction.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::points::PointsRepository;
use crate::domain::repositories::RepositoryProvider;
use crate::domain::reservation::ReservationRepository;
use crate::domain::shop::ShopRepository;
use crate::domain::{
    DomainError, DomainResult, LotStatus, PointsLot, PointsUsage, Reservation, ReservationStatus,
    Shop, ShopService, StateTransition,
};

/// In-memory storage for development and testing
pub struct InMemoryRepositoryProvider {
    reservations: DashMap<Uuid, Reservation>,
    transitions: DashMap<Uuid, Vec<StateTransition>>,
    lots: DashMap<Uuid, PointsLot>,
    usages: DashMap<Uuid, PointsUsage>,
    shops: DashMap<Uuid, Shop>,
    services: DashMap<Uuid, ShopService>,
    write_gate: Mutex<()>,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self {
            reservations: DashMap::new(),
            transitions: DashMap::new(),
            lots: DashMap::new(),
            usages: DashMap::new(),
            shops: DashMap::new(),
            services: DashMap::new(),
            write_gate: Mutex::new(()),
        }
    }

    /// Register or replace a shop.
    pub fn seed_shop(&self, shop: Shop) {
        self.shops.insert(shop.id, shop);
    }

    /// Register or replace a service.
    pub fn seed_service(&self, service: ShopService) {
        self.services.insert(service.id, service);
    }

    /// Every stored reservation, for invariant scans.
    pub fn all_reservations(&self) -> Vec<Reservation> {
        self.reservations.iter().map(|e| e.value().clone()).collect()
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_lot_versions(&self, lots: &[PointsLot]) -> DomainResult<()> {
        for lot in lots {
            let stored = self
                .lots
                .get(&lot.id)
                .ok_or_else(|| DomainError::not_found("PointsLot", "id", lot.id))?;
            if stored.version != lot.version {
                return Err(DomainError::ConcurrentModification {
                    entity: "PointsLot",
                    id: lot.id,
                });
            }
        }
        Ok(())
    }

    fn store_lots(&self, lots: Vec<PointsLot>) {
        for mut lot in lots {
            lot.version += 1;
            self.lots.insert(lot.id, lot);
        }
    }
}

impl Default for InMemoryRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn reservations(&self) -> &dyn ReservationRepository {
        self
    }

    fn points(&self) -> &dyn PointsRepository {
        self
    }

    fn shops(&self) -> &dyn ShopRepository {
        self
    }
}

#[async_trait]
impl ReservationRepository for InMemoryRepositoryProvider {
    async fn insert(&self, reservation: Reservation, created: StateTransition) -> DomainResult<()> {
        let _gate = self.gate();
        if self.reservations.contains_key(&reservation.id) {
            return Err(DomainError::Storage(format!(
                "reservation {} already exists",
                reservation.id
            )));
        }
        self.transitions.insert(reservation.id, vec![created]);
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>> {
        Ok(self.reservations.get(&id).map(|r| r.clone()))
    }

    async fn apply_transition(
        &self,
        reservation: Reservation,
        expected_version: i64,
        transition: StateTransition,
    ) -> DomainResult<()> {
        let _gate = self.gate();
        let id = reservation.id;
        let stored_version = self
            .reservations
            .get(&id)
            .map(|r| r.version)
            .ok_or_else(|| DomainError::not_found("Reservation", "id", id))?;
        if stored_version != expected_version {
            return Err(DomainError::ConcurrentModification {
                entity: "Reservation",
                id,
            });
        }
        self.reservations.insert(id, reservation);
        self.transitions.entry(id).or_default().push(transition);
        Ok(())
    }

    async fn find_active_for_shop_on_date(
        &self,
        shop_id: Uuid,
        date: NaiveDate,
    ) -> DomainResult<Vec<Reservation>> {
        Ok(self
            .reservations
            .iter()
            .filter(|r| r.shop_id == shop_id && r.reservation_date == date && r.is_active())
            .map(|r| r.clone())
            .collect())
    }

    async fn find_by_status_starting_before(
        &self,
        status: ReservationStatus,
        cutoff: NaiveDateTime,
    ) -> DomainResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.status == status && r.starts_at() < cutoff)
            .map(|r| r.clone())
            .collect();
        found.sort_by_key(|r| (r.starts_at(), r.id));
        Ok(found)
    }

    async fn find_for_customer(&self, customer_id: Uuid) -> DomainResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .map(|r| r.clone())
            .collect();
        found.sort_by(|a, b| b.starts_at().cmp(&a.starts_at()));
        Ok(found)
    }

    async fn transitions_for(&self, reservation_id: Uuid) -> DomainResult<Vec<StateTransition>> {
        Ok(self
            .transitions
            .get(&reservation_id)
            .map(|t| t.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PointsRepository for InMemoryRepositoryProvider {
    async fn insert_lot(&self, lot: PointsLot) -> DomainResult<()> {
        let _gate = self.gate();
        if self.lots.contains_key(&lot.id) {
            return Err(DomainError::Storage(format!("lot {} already exists", lot.id)));
        }
        self.lots.insert(lot.id, lot);
        Ok(())
    }

    async fn find_lot(&self, id: Uuid) -> DomainResult<Option<PointsLot>> {
        Ok(self.lots.get(&id).map(|l| l.clone()))
    }

    async fn find_lots_for_user(&self, user_id: Uuid) -> DomainResult<Vec<PointsLot>> {
        let mut lots: Vec<PointsLot> = self
            .lots
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.clone())
            .collect();
        crate::domain::points::fifo_order(&mut lots);
        Ok(lots)
    }

    async fn find_lots_for_reservation(
        &self,
        reservation_id: Uuid,
    ) -> DomainResult<Vec<PointsLot>> {
        Ok(self
            .lots
            .iter()
            .filter(|l| l.origin == crate::domain::LotOrigin::Reservation(reservation_id))
            .map(|l| l.clone())
            .collect())
    }

    async fn record_usage(&self, lots: Vec<PointsLot>, usage: PointsUsage) -> DomainResult<()> {
        let _gate = self.gate();
        self.check_lot_versions(&lots)?;
        self.store_lots(lots);
        self.usages.insert(usage.id, usage);
        Ok(())
    }

    async fn find_usage(&self, id: Uuid) -> DomainResult<Option<PointsUsage>> {
        Ok(self.usages.get(&id).map(|u| u.clone()))
    }

    async fn record_reversal(
        &self,
        lots: Vec<PointsLot>,
        adjustment: Option<PointsLot>,
        usage: PointsUsage,
    ) -> DomainResult<()> {
        let _gate = self.gate();
        let already_reversed = self
            .usages
            .get(&usage.id)
            .map(|u| u.is_reversed())
            .ok_or_else(|| DomainError::not_found("PointsUsage", "id", usage.id))?;
        if already_reversed {
            return Err(DomainError::ConcurrentModification {
                entity: "PointsUsage",
                id: usage.id,
            });
        }
        self.check_lot_versions(&lots)?;

        self.store_lots(lots);
        if let Some(adjustment) = adjustment {
            self.lots.insert(adjustment.id, adjustment);
        }
        self.usages.insert(usage.id, usage);
        Ok(())
    }

    async fn transition_lot(
        &self,
        id: Uuid,
        from: LotStatus,
        to: LotStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let _gate = self.gate();
        match self.lots.get_mut(&id) {
            Some(mut lot) if lot.status == from => {
                lot.status = to;
                lot.version += 1;
                lot.updated_at = at;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DomainError::not_found("PointsLot", "id", id)),
        }
    }

    async fn find_lot_ids_due_for_activation(&self, now: DateTime<Utc>) -> DomainResult<Vec<Uuid>> {
        Ok(self
            .lots
            .iter()
            .filter(|l| l.status == LotStatus::Pending && l.activates_at <= now && l.expires_at > now)
            .map(|l| l.id)
            .collect())
    }

    async fn find_lots_due_for_expiry(&self, now: DateTime<Utc>) -> DomainResult<Vec<PointsLot>> {
        Ok(self
            .lots
            .iter()
            .filter(|l| {
                matches!(l.status, LotStatus::Pending | LotStatus::Active) && l.expires_at <= now
            })
            .map(|l| l.clone())
            .collect())
    }
}

#[async_trait]
impl ShopRepository for InMemoryRepositoryProvider {
    async fn find_shop(&self, id: Uuid) -> DomainResult<Option<Shop>> {
        Ok(self.shops.get(&id).map(|s| s.clone()))
    }

    async fn find_services(&self, shop_id: Uuid, ids: &[Uuid]) -> DomainResult<Vec<ShopService>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.services.get(id).map(|s| s.clone()))
            .filter(|s| s.shop_id == shop_id)
            .collect())
    }
}
