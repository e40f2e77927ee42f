//! Create reservations table
//!
//! One row per booking. `version` is the optimistic concurrency token
//! every state transition compares against.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_shops::Shops;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reservations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Reservations::ShopId).uuid().not_null())
                    .col(ColumnDef::new(Reservations::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Reservations::ServiceIds).json().not_null())
                    .col(
                        ColumnDef::new(Reservations::ReservationDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::ReservationTime)
                            .time()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::DurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::Status)
                            .string()
                            .not_null()
                            .default("requested"),
                    )
                    .col(
                        ColumnDef::new(Reservations::TotalAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::DepositAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Reservations::DepositStatus)
                            .string()
                            .not_null()
                            .default("not_required"),
                    )
                    .col(
                        ColumnDef::new(Reservations::RemainingAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::PointsUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Reservations::PointsUsageId).uuid())
                    .col(
                        ColumnDef::new(Reservations::PointsEarned)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Reservations::SpecialRequests).text())
                    .col(ColumnDef::new(Reservations::CancellationReason).string())
                    .col(
                        ColumnDef::new(Reservations::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Reservations::ConfirmedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::CancelledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::NoShowAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::ReviewDeadline).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Reservations::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Reservations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservations_shop")
                            .from(Reservations::Table, Reservations::ShopId)
                            .to(Shops::Table, Shops::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_shop_date_status")
                    .table(Reservations::Table)
                    .col(Reservations::ShopId)
                    .col(Reservations::ReservationDate)
                    .col(Reservations::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_status_date")
                    .table(Reservations::Table)
                    .col(Reservations::Status)
                    .col(Reservations::ReservationDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_customer")
                    .table(Reservations::Table)
                    .col(Reservations::CustomerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reservations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Reservations {
    Table,
    Id,
    ShopId,
    CustomerId,
    ServiceIds,
    ReservationDate,
    ReservationTime,
    DurationMinutes,
    Status,
    TotalAmount,
    DepositAmount,
    DepositStatus,
    RemainingAmount,
    PointsUsed,
    PointsUsageId,
    PointsEarned,
    SpecialRequests,
    CancellationReason,
    RequestedAt,
    ConfirmedAt,
    StartedAt,
    CompletedAt,
    CancelledAt,
    NoShowAt,
    ReviewDeadline,
    Version,
    CreatedAt,
    UpdatedAt,
}
