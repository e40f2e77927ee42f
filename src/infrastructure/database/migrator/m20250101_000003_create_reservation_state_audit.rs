//! Create reservation_state_audit table
//!
//! Append-only log of every status change, including the creation row.

use sea_orm_migration::prelude::*;

use super::m20250101_000002_create_reservations::Reservations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReservationStateAudit::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReservationStateAudit::Seq)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReservationStateAudit::Id)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ReservationStateAudit::ReservationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReservationStateAudit::FromStatus).string())
                    .col(
                        ColumnDef::new(ReservationStateAudit::ToStatus)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReservationStateAudit::Actor)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReservationStateAudit::Reason).text())
                    .col(
                        ColumnDef::new(ReservationStateAudit::Metadata)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReservationStateAudit::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_state_audit_reservation")
                            .from(
                                ReservationStateAudit::Table,
                                ReservationStateAudit::ReservationId,
                            )
                            .to(Reservations::Table, Reservations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_state_audit_reservation")
                    .table(ReservationStateAudit::Table)
                    .col(ReservationStateAudit::ReservationId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReservationStateAudit::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ReservationStateAudit {
    Table,
    Seq,
    Id,
    ReservationId,
    FromStatus,
    ToStatus,
    Actor,
    Reason,
    Metadata,
    CreatedAt,
}
