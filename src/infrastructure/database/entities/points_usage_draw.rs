//! One lot's share of a points usage

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "points_usage_draws")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub usage_id: Uuid,

    /// Draw order within the usage
    #[sea_orm(primary_key, auto_increment = false)]
    pub seq: i32,

    pub lot_id: Uuid,
    pub amount: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::points_usage::Entity",
        from = "Column::UsageId",
        to = "super::points_usage::Column::Id"
    )]
    Usage,
}

impl Related<super::points_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
