//! Points lot entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "points_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,
    pub amount: i64,
    pub remaining: i64,

    /// reservation, signup_bonus, referral, admin_adjustment, refund_adjustment
    pub origin_kind: String,

    /// Reservation id, referred user or reversed usage, depending on kind
    #[sea_orm(nullable)]
    pub origin_ref: Option<Uuid>,

    /// pending, active, used, expired, cancelled
    pub status: String,

    pub issued_at: DateTimeUtc,
    pub activates_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,

    pub version: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
