//! Create points ledger tables
//!
//! - `points_lots`: FIFO units with their own hold and expiry
//! - `points_usage`: spend records
//! - `points_usage_draws`: which lots each spend drew from, in order

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PointsLots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PointsLots::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(PointsLots::UserId).uuid().not_null())
                    .col(ColumnDef::new(PointsLots::Amount).big_integer().not_null())
                    .col(ColumnDef::new(PointsLots::Remaining).big_integer().not_null())
                    .col(ColumnDef::new(PointsLots::OriginKind).string().not_null())
                    .col(ColumnDef::new(PointsLots::OriginRef).uuid())
                    .col(ColumnDef::new(PointsLots::Status).string().not_null())
                    .col(
                        ColumnDef::new(PointsLots::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsLots::ActivatesAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsLots::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsLots::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PointsLots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsLots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_points_lots_user_issued")
                    .table(PointsLots::Table)
                    .col(PointsLots::UserId)
                    .col(PointsLots::IssuedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_points_lots_status_expiry")
                    .table(PointsLots::Table)
                    .col(PointsLots::Status)
                    .col(PointsLots::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_points_lots_origin")
                    .table(PointsLots::Table)
                    .col(PointsLots::OriginKind)
                    .col(PointsLots::OriginRef)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PointsUsage::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PointsUsage::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(PointsUsage::UserId).uuid().not_null())
                    .col(ColumnDef::new(PointsUsage::ReservationId).uuid())
                    .col(ColumnDef::new(PointsUsage::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(PointsUsage::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PointsUsage::ReversedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PointsUsageDraws::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PointsUsageDraws::UsageId).uuid().not_null())
                    .col(ColumnDef::new(PointsUsageDraws::Seq).integer().not_null())
                    .col(ColumnDef::new(PointsUsageDraws::LotId).uuid().not_null())
                    .col(
                        ColumnDef::new(PointsUsageDraws::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PointsUsageDraws::UsageId)
                            .col(PointsUsageDraws::Seq),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_draws_usage")
                            .from(PointsUsageDraws::Table, PointsUsageDraws::UsageId)
                            .to(PointsUsage::Table, PointsUsage::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_draws_lot")
                            .from(PointsUsageDraws::Table, PointsUsageDraws::LotId)
                            .to(PointsLots::Table, PointsLots::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PointsUsageDraws::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PointsUsage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PointsLots::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum PointsLots {
    Table,
    Id,
    UserId,
    Amount,
    Remaining,
    OriginKind,
    OriginRef,
    Status,
    IssuedAt,
    ActivatesAt,
    ExpiresAt,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum PointsUsage {
    Table,
    Id,
    UserId,
    ReservationId,
    Amount,
    CreatedAt,
    ReversedAt,
}

#[derive(Iden)]
pub enum PointsUsageDraws {
    Table,
    UsageId,
    Seq,
    LotId,
    Amount,
}
