//! SeaORM implementation of PointsRepository
//!
//! Lot writes are guarded by `version`; a spend or reversal that touches
//! several lots runs in one transaction and aborts on the first stale lot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::domain::points::{fifo_order, PointsRepository, UsageDraw};
use crate::domain::{DomainError, DomainResult, LotOrigin, LotStatus, PointsLot, PointsUsage};
use crate::infrastructure::database::entities::{points_lot, points_usage, points_usage_draw};

use super::db_err;

pub struct SeaOrmPointsRepository {
    db: DatabaseConnection,
}

impl SeaOrmPointsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn load_usage<C: ConnectionTrait>(
        conn: &C,
        model: points_usage::Model,
    ) -> DomainResult<PointsUsage> {
        let draws = points_usage_draw::Entity::find()
            .filter(points_usage_draw::Column::UsageId.eq(model.id))
            .order_by_asc(points_usage_draw::Column::Seq)
            .all(conn)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(|d| UsageDraw {
                lot_id: d.lot_id,
                amount: d.amount,
            })
            .collect();

        Ok(PointsUsage {
            id: model.id,
            user_id: model.user_id,
            reservation_id: model.reservation_id,
            amount: model.amount,
            draws,
            created_at: model.created_at,
            reversed_at: model.reversed_at,
        })
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn lot_to_domain(m: points_lot::Model) -> DomainResult<PointsLot> {
    Ok(PointsLot {
        id: m.id,
        user_id: m.user_id,
        amount: m.amount,
        remaining: m.remaining,
        origin: LotOrigin::from_parts(&m.origin_kind, m.origin_ref)?,
        status: m.status.parse()?,
        issued_at: m.issued_at,
        activates_at: m.activates_at,
        expires_at: m.expires_at,
        version: m.version,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn lot_to_active(l: &PointsLot) -> points_lot::ActiveModel {
    points_lot::ActiveModel {
        id: Set(l.id),
        user_id: Set(l.user_id),
        amount: Set(l.amount),
        remaining: Set(l.remaining),
        origin_kind: Set(l.origin.kind().to_string()),
        origin_ref: Set(l.origin.reference()),
        status: Set(l.status.as_str().to_string()),
        issued_at: Set(l.issued_at),
        activates_at: Set(l.activates_at),
        expires_at: Set(l.expires_at),
        version: Set(l.version),
        created_at: Set(l.created_at),
        updated_at: Set(l.updated_at),
    }
}

fn collect_lots(models: Vec<points_lot::Model>) -> DomainResult<Vec<PointsLot>> {
    models.into_iter().map(lot_to_domain).collect()
}

/// Write `lots` with a version compare-and-set each. Runs inside the
/// caller's transaction.
async fn write_versioned_lots<C: ConnectionTrait>(conn: &C, lots: &[PointsLot]) -> DomainResult<()> {
    for lot in lots {
        let mut model = lot_to_active(lot);
        model.id = NotSet;
        model.version = Set(lot.version + 1);

        let result = points_lot::Entity::update_many()
            .set(model)
            .filter(points_lot::Column::Id.eq(lot.id))
            .filter(points_lot::Column::Version.eq(lot.version))
            .exec(conn)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            let exists = points_lot::Entity::find_by_id(lot.id)
                .one(conn)
                .await
                .map_err(db_err)?
                .is_some();
            return Err(if exists {
                DomainError::ConcurrentModification {
                    entity: "PointsLot",
                    id: lot.id,
                }
            } else {
                DomainError::not_found("PointsLot", "id", lot.id)
            });
        }
    }
    Ok(())
}

// ── PointsRepository impl ───────────────────────────────────────

#[async_trait]
impl PointsRepository for SeaOrmPointsRepository {
    async fn insert_lot(&self, lot: PointsLot) -> DomainResult<()> {
        debug!(lot_id = %lot.id, user_id = %lot.user_id, amount = lot.amount, "Inserting points lot");
        lot_to_active(&lot).insert(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn find_lot(&self, id: Uuid) -> DomainResult<Option<PointsLot>> {
        points_lot::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(lot_to_domain)
            .transpose()
    }

    async fn find_lots_for_user(&self, user_id: Uuid) -> DomainResult<Vec<PointsLot>> {
        let models = points_lot::Entity::find()
            .filter(points_lot::Column::UserId.eq(user_id))
            .order_by_asc(points_lot::Column::IssuedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        let mut lots = collect_lots(models)?;
        fifo_order(&mut lots);
        Ok(lots)
    }

    async fn find_lots_for_reservation(
        &self,
        reservation_id: Uuid,
    ) -> DomainResult<Vec<PointsLot>> {
        let models = points_lot::Entity::find()
            .filter(points_lot::Column::OriginKind.eq(LotOrigin::Reservation(reservation_id).kind()))
            .filter(points_lot::Column::OriginRef.eq(reservation_id))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect_lots(models)
    }

    async fn record_usage(&self, lots: Vec<PointsLot>, usage: PointsUsage) -> DomainResult<()> {
        debug!(
            usage_id = %usage.id,
            user_id = %usage.user_id,
            amount = usage.amount,
            lots = lots.len(),
            "Recording points usage"
        );

        let txn = self.db.begin().await.map_err(db_err)?;
        write_versioned_lots(&txn, &lots).await?;

        points_usage::ActiveModel {
            id: Set(usage.id),
            user_id: Set(usage.user_id),
            reservation_id: Set(usage.reservation_id),
            amount: Set(usage.amount),
            created_at: Set(usage.created_at),
            reversed_at: Set(usage.reversed_at),
        }
        .insert(&txn)
        .await
        .map_err(db_err)?;

        for (seq, draw) in usage.draws.iter().enumerate() {
            points_usage_draw::ActiveModel {
                usage_id: Set(usage.id),
                seq: Set(seq as i32),
                lot_id: Set(draw.lot_id),
                amount: Set(draw.amount),
            }
            .insert(&txn)
            .await
            .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_usage(&self, id: Uuid) -> DomainResult<Option<PointsUsage>> {
        let model = points_usage::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        match model {
            Some(model) => Ok(Some(Self::load_usage(&self.db, model).await?)),
            None => Ok(None),
        }
    }

    async fn record_reversal(
        &self,
        lots: Vec<PointsLot>,
        adjustment: Option<PointsLot>,
        usage: PointsUsage,
    ) -> DomainResult<()> {
        debug!(usage_id = %usage.id, lots = lots.len(), "Recording points reversal");

        let txn = self.db.begin().await.map_err(db_err)?;

        let marked = points_usage::Entity::update_many()
            .col_expr(points_usage::Column::ReversedAt, Expr::value(usage.reversed_at))
            .filter(points_usage::Column::Id.eq(usage.id))
            .filter(points_usage::Column::ReversedAt.is_null())
            .exec(&txn)
            .await
            .map_err(db_err)?;
        if marked.rows_affected == 0 {
            let exists = points_usage::Entity::find_by_id(usage.id)
                .one(&txn)
                .await
                .map_err(db_err)?
                .is_some();
            return Err(if exists {
                DomainError::ConcurrentModification {
                    entity: "PointsUsage",
                    id: usage.id,
                }
            } else {
                DomainError::not_found("PointsUsage", "id", usage.id)
            });
        }

        write_versioned_lots(&txn, &lots).await?;
        if let Some(adjustment) = adjustment {
            lot_to_active(&adjustment)
                .insert(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn transition_lot(
        &self,
        id: Uuid,
        from: LotStatus,
        to: LotStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result = points_lot::Entity::update_many()
            .col_expr(points_lot::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                points_lot::Column::Version,
                Expr::col(points_lot::Column::Version).add(1),
            )
            .col_expr(points_lot::Column::UpdatedAt, Expr::value(at))
            .filter(points_lot::Column::Id.eq(id))
            .filter(points_lot::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected > 0 {
            return Ok(true);
        }
        match self.find_lot(id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::not_found("PointsLot", "id", id)),
        }
    }

    async fn find_lot_ids_due_for_activation(&self, now: DateTime<Utc>) -> DomainResult<Vec<Uuid>> {
        let models = points_lot::Entity::find()
            .filter(points_lot::Column::Status.eq(LotStatus::Pending.as_str()))
            .filter(points_lot::Column::ActivatesAt.lte(now))
            .filter(points_lot::Column::ExpiresAt.gt(now))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(|m| m.id).collect())
    }

    async fn find_lots_due_for_expiry(&self, now: DateTime<Utc>) -> DomainResult<Vec<PointsLot>> {
        let models = points_lot::Entity::find()
            .filter(
                points_lot::Column::Status
                    .is_in([LotStatus::Pending.as_str(), LotStatus::Active.as_str()]),
            )
            .filter(points_lot::Column::ExpiresAt.lte(now))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect_lots(models)
    }
}
