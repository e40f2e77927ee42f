//! SeaORM implementation of ReservationRepository

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::domain::reservation::ReservationRepository;
use crate::domain::{
    Actor, DomainError, DomainResult, Reservation, ReservationStatus, StateTransition,
};
use crate::infrastructure::database::entities::{reservation, reservation_state_audit};

use super::db_err;

pub struct SeaOrmReservationRepository {
    db: DatabaseConnection,
}

impl SeaOrmReservationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: reservation::Model) -> DomainResult<Reservation> {
    let service_ids: Vec<Uuid> = serde_json::from_value(m.service_ids).map_err(|e| {
        DomainError::Storage(format!("reservation {} has malformed service_ids: {}", m.id, e))
    })?;

    Ok(Reservation {
        id: m.id,
        shop_id: m.shop_id,
        customer_id: m.customer_id,
        service_ids,
        reservation_date: m.reservation_date,
        reservation_time: m.reservation_time,
        duration_minutes: m.duration_minutes,
        status: m.status.parse()?,
        total_amount: m.total_amount,
        deposit_amount: m.deposit_amount,
        deposit_status: m.deposit_status.parse()?,
        remaining_amount: m.remaining_amount,
        points_used: m.points_used,
        points_usage_id: m.points_usage_id,
        points_earned: m.points_earned,
        special_requests: m.special_requests,
        cancellation_reason: m
            .cancellation_reason
            .as_deref()
            .map(str::parse)
            .transpose()?,
        requested_at: m.requested_at,
        confirmed_at: m.confirmed_at,
        started_at: m.started_at,
        completed_at: m.completed_at,
        cancelled_at: m.cancelled_at,
        no_show_at: m.no_show_at,
        review_deadline: m.review_deadline,
        version: m.version,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn to_active(r: &Reservation) -> reservation::ActiveModel {
    let service_ids = serde_json::Value::Array(
        r.service_ids
            .iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    );

    reservation::ActiveModel {
        id: Set(r.id),
        shop_id: Set(r.shop_id),
        customer_id: Set(r.customer_id),
        service_ids: Set(service_ids),
        reservation_date: Set(r.reservation_date),
        reservation_time: Set(r.reservation_time),
        duration_minutes: Set(r.duration_minutes),
        status: Set(r.status.as_str().to_string()),
        total_amount: Set(r.total_amount),
        deposit_amount: Set(r.deposit_amount),
        deposit_status: Set(r.deposit_status.as_str().to_string()),
        remaining_amount: Set(r.remaining_amount),
        points_used: Set(r.points_used),
        points_usage_id: Set(r.points_usage_id),
        points_earned: Set(r.points_earned),
        special_requests: Set(r.special_requests.clone()),
        cancellation_reason: Set(r.cancellation_reason.map(|c| c.as_str().to_string())),
        requested_at: Set(r.requested_at),
        confirmed_at: Set(r.confirmed_at),
        started_at: Set(r.started_at),
        completed_at: Set(r.completed_at),
        cancelled_at: Set(r.cancelled_at),
        no_show_at: Set(r.no_show_at),
        review_deadline: Set(r.review_deadline),
        version: Set(r.version),
        created_at: Set(r.created_at),
        updated_at: Set(r.updated_at),
    }
}

fn audit_to_domain(m: reservation_state_audit::Model) -> DomainResult<StateTransition> {
    Ok(StateTransition {
        id: m.id,
        reservation_id: m.reservation_id,
        from_status: m
            .from_status
            .as_deref()
            .map(str::parse::<ReservationStatus>)
            .transpose()?,
        to_status: m.to_status.parse()?,
        actor: m.actor.parse::<Actor>()?,
        reason: m.reason,
        metadata: m.metadata,
        created_at: m.created_at,
    })
}

fn audit_to_active(t: &StateTransition) -> reservation_state_audit::ActiveModel {
    reservation_state_audit::ActiveModel {
        seq: NotSet,
        id: Set(t.id),
        reservation_id: Set(t.reservation_id),
        from_status: Set(t.from_status.map(|s| s.as_str().to_string())),
        to_status: Set(t.to_status.as_str().to_string()),
        actor: Set(t.actor.as_str().to_string()),
        reason: Set(t.reason.clone()),
        metadata: Set(t.metadata.clone()),
        created_at: Set(t.created_at),
    }
}

fn collect(models: Vec<reservation::Model>) -> DomainResult<Vec<Reservation>> {
    models.into_iter().map(model_to_domain).collect()
}

// ── ReservationRepository impl ──────────────────────────────────

#[async_trait]
impl ReservationRepository for SeaOrmReservationRepository {
    async fn insert(&self, r: Reservation, created: StateTransition) -> DomainResult<()> {
        debug!(reservation_id = %r.id, status = %r.status, "Inserting reservation");

        let txn = self.db.begin().await.map_err(db_err)?;
        to_active(&r).insert(&txn).await.map_err(db_err)?;
        audit_to_active(&created).insert(&txn).await.map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>> {
        let model = reservation::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn apply_transition(
        &self,
        r: Reservation,
        expected_version: i64,
        transition: StateTransition,
    ) -> DomainResult<()> {
        let id = r.id;
        debug!(
            reservation_id = %id,
            to = %r.status,
            expected_version,
            "Applying reservation transition"
        );

        let txn = self.db.begin().await.map_err(db_err)?;

        let mut model = to_active(&r);
        model.id = NotSet;
        let result = reservation::Entity::update_many()
            .set(model)
            .filter(reservation::Column::Id.eq(id))
            .filter(reservation::Column::Version.eq(expected_version))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            txn.rollback().await.map_err(db_err)?;
            let exists = reservation::Entity::find_by_id(id)
                .one(&self.db)
                .await
                .map_err(db_err)?
                .is_some();
            return Err(if exists {
                DomainError::ConcurrentModification {
                    entity: "Reservation",
                    id,
                }
            } else {
                DomainError::not_found("Reservation", "id", id)
            });
        }

        audit_to_active(&transition)
            .insert(&txn)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_active_for_shop_on_date(
        &self,
        shop_id: Uuid,
        date: NaiveDate,
    ) -> DomainResult<Vec<Reservation>> {
        let active: Vec<&str> = ReservationStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        let models = reservation::Entity::find()
            .filter(reservation::Column::ShopId.eq(shop_id))
            .filter(reservation::Column::ReservationDate.eq(date))
            .filter(reservation::Column::Status.is_in(active))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn find_by_status_starting_before(
        &self,
        status: ReservationStatus,
        cutoff: NaiveDateTime,
    ) -> DomainResult<Vec<Reservation>> {
        // Date narrows in SQL; the exact start comparison happens here.
        let models = reservation::Entity::find()
            .filter(reservation::Column::Status.eq(status.as_str()))
            .filter(reservation::Column::ReservationDate.lte(cutoff.date()))
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let mut found: Vec<Reservation> = collect(models)?
            .into_iter()
            .filter(|r| r.starts_at() < cutoff)
            .collect();
        found.sort_by_key(|r| (r.starts_at(), r.id));
        Ok(found)
    }

    async fn find_for_customer(&self, customer_id: Uuid) -> DomainResult<Vec<Reservation>> {
        let models = reservation::Entity::find()
            .filter(reservation::Column::CustomerId.eq(customer_id))
            .order_by_desc(reservation::Column::ReservationDate)
            .order_by_desc(reservation::Column::ReservationTime)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn transitions_for(&self, reservation_id: Uuid) -> DomainResult<Vec<StateTransition>> {
        reservation_state_audit::Entity::find()
            .filter(reservation_state_audit::Column::ReservationId.eq(reservation_id))
            .order_by_asc(reservation_state_audit::Column::Seq)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(audit_to_domain)
            .collect()
    }
}
