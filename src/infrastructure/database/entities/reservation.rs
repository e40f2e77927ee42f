//! Reservation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub shop_id: Uuid,
    pub customer_id: Uuid,

    /// JSON array of service ids
    pub service_ids: Json,

    /// Shop-local slot date and start time
    pub reservation_date: Date,
    pub reservation_time: Time,
    pub duration_minutes: i32,

    /// requested, confirmed, in_progress, completed, cancelled_by_user,
    /// cancelled_by_shop, no_show
    pub status: String,

    pub total_amount: i64,
    pub deposit_amount: i64,
    pub deposit_status: String,
    pub remaining_amount: i64,
    pub points_used: i64,

    #[sea_orm(nullable)]
    pub points_usage_id: Option<Uuid>,

    pub points_earned: i64,

    #[sea_orm(nullable)]
    pub special_requests: Option<String>,

    #[sea_orm(nullable)]
    pub cancellation_reason: Option<String>,

    pub requested_at: DateTimeUtc,
    pub confirmed_at: Option<DateTimeUtc>,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub no_show_at: Option<DateTimeUtc>,
    pub review_deadline: Option<DateTimeUtc>,

    /// Optimistic concurrency token
    pub version: i64,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id"
    )]
    Shop,
    #[sea_orm(has_many = "super::reservation_state_audit::Entity")]
    StateAudit,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl Related<super::reservation_state_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StateAudit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
