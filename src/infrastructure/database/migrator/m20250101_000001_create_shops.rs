//! Create shops and shop_services tables
//!
//! Slot capacity, operating hours and the service catalogue the booking
//! engine reads when validating a request.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Shops::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Shops::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Shops::Name).string().not_null())
                    .col(
                        ColumnDef::new(Shops::SlotCapacity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Shops::SlotIntervalMinutes)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(ColumnDef::new(Shops::OpeningTime).time().not_null())
                    .col(ColumnDef::new(Shops::ClosingTime).time().not_null())
                    .col(
                        ColumnDef::new(Shops::AutoConfirm)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Shops::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ShopServices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShopServices::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ShopServices::ShopId).uuid().not_null())
                    .col(ColumnDef::new(ShopServices::Name).string().not_null())
                    .col(
                        ColumnDef::new(ShopServices::DurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShopServices::Price)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ShopServices::DepositAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ShopServices::Exclusive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ShopServices::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shop_services_shop")
                            .from(ShopServices::Table, ShopServices::ShopId)
                            .to(Shops::Table, Shops::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_shop_services_shop")
                    .table(ShopServices::Table)
                    .col(ShopServices::ShopId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ShopServices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Shops::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Shops {
    Table,
    Id,
    Name,
    SlotCapacity,
    SlotIntervalMinutes,
    OpeningTime,
    ClosingTime,
    AutoConfirm,
    IsActive,
}

#[derive(Iden)]
pub enum ShopServices {
    Table,
    Id,
    ShopId,
    Name,
    DurationMinutes,
    Price,
    DepositAmount,
    Exclusive,
    IsActive,
}
