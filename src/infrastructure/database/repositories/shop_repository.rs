//! SeaORM implementation of ShopRepository

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

use crate::domain::shop::ShopRepository;
use crate::domain::{DomainResult, Shop, ShopService};
use crate::infrastructure::database::entities::{shop, shop_service};

use super::db_err;

pub struct SeaOrmShopRepository {
    db: DatabaseConnection,
}

impl SeaOrmShopRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or replace a shop row.
    pub async fn save_shop(&self, s: &Shop) -> DomainResult<()> {
        debug!(shop_id = %s.id, "Saving shop");
        let exists = shop::Entity::find_by_id(s.id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .is_some();

        let model = shop::ActiveModel {
            id: Set(s.id),
            name: Set(s.name.clone()),
            slot_capacity: Set(s.slot_capacity),
            slot_interval_minutes: Set(s.slot_interval_minutes),
            opening_time: Set(s.opening_time),
            closing_time: Set(s.closing_time),
            auto_confirm: Set(s.auto_confirm),
            is_active: Set(s.is_active),
        };
        if exists {
            model.update(&self.db).await.map_err(db_err)?;
        } else {
            model.insert(&self.db).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Insert or replace a service row. The shop must already exist.
    pub async fn save_service(&self, s: &ShopService) -> DomainResult<()> {
        debug!(service_id = %s.id, shop_id = %s.shop_id, "Saving shop service");
        let exists = shop_service::Entity::find_by_id(s.id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .is_some();

        let model = shop_service::ActiveModel {
            id: Set(s.id),
            shop_id: Set(s.shop_id),
            name: Set(s.name.clone()),
            duration_minutes: Set(s.duration_minutes),
            price: Set(s.price),
            deposit_amount: Set(s.deposit_amount),
            exclusive: Set(s.exclusive),
            is_active: Set(s.is_active),
        };
        if exists {
            model.update(&self.db).await.map_err(db_err)?;
        } else {
            model.insert(&self.db).await.map_err(db_err)?;
        }
        Ok(())
    }
}

fn shop_to_domain(m: shop::Model) -> Shop {
    Shop {
        id: m.id,
        name: m.name,
        slot_capacity: m.slot_capacity,
        slot_interval_minutes: m.slot_interval_minutes,
        opening_time: m.opening_time,
        closing_time: m.closing_time,
        auto_confirm: m.auto_confirm,
        is_active: m.is_active,
    }
}

fn service_to_domain(m: shop_service::Model) -> ShopService {
    ShopService {
        id: m.id,
        shop_id: m.shop_id,
        name: m.name,
        duration_minutes: m.duration_minutes,
        price: m.price,
        deposit_amount: m.deposit_amount,
        exclusive: m.exclusive,
        is_active: m.is_active,
    }
}

#[async_trait]
impl ShopRepository for SeaOrmShopRepository {
    async fn find_shop(&self, id: Uuid) -> DomainResult<Option<Shop>> {
        let model = shop::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(shop_to_domain))
    }

    async fn find_services(&self, shop_id: Uuid, ids: &[Uuid]) -> DomainResult<Vec<ShopService>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut services: Vec<ShopService> = shop_service::Entity::find()
            .filter(shop_service::Column::ShopId.eq(shop_id))
            .filter(shop_service::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(service_to_domain)
            .collect();

        // Keep the caller's order
        services.sort_by_key(|s| ids.iter().position(|id| *id == s.id));
        Ok(services)
    }
}
