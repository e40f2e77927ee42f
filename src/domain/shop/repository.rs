//! Shop configuration store interface

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{Shop, ShopService};
use crate::domain::DomainResult;

/// Read-only access to shop capacity, hours and services.
#[async_trait]
pub trait ShopRepository: Send + Sync {
    async fn find_shop(&self, id: Uuid) -> DomainResult<Option<Shop>>;

    /// Services with the given ids that belong to `shop_id`. Unknown ids
    /// are silently absent from the result.
    async fn find_services(&self, shop_id: Uuid, ids: &[Uuid]) -> DomainResult<Vec<ShopService>>;
}
