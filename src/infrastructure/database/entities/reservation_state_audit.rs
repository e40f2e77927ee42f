//! Reservation state audit entity (append-only)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation_state_audit")]
pub struct Model {
    /// Insertion order; history is read back in this order
    #[sea_orm(primary_key)]
    pub seq: i32,

    #[sea_orm(unique)]
    pub id: Uuid,

    pub reservation_id: Uuid,

    /// NULL on the creation row
    #[sea_orm(nullable)]
    pub from_status: Option<String>,

    pub to_status: String,

    /// customer, shop, system
    pub actor: String,

    #[sea_orm(nullable)]
    pub reason: Option<String>,

    pub metadata: Json,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reservation::Entity",
        from = "Column::ReservationId",
        to = "super::reservation::Column::Id"
    )]
    Reservation,
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
