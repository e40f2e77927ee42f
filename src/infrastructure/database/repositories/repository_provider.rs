//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::points::PointsRepository;
use crate::domain::repositories::RepositoryProvider;
use crate::domain::reservation::ReservationRepository;
use crate::domain::shop::ShopRepository;

use super::points_repository::SeaOrmPointsRepository;
use super::reservation_repository::SeaOrmReservationRepository;
use super::shop_repository::SeaOrmShopRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-aggregate repository accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone());
/// let r = repos.reservations().find_by_id(id).await?;
/// let lots = repos.points().find_lots_for_user(r.customer_id).await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    reservations: SeaOrmReservationRepository,
    points: SeaOrmPointsRepository,
    shops: SeaOrmShopRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            reservations: SeaOrmReservationRepository::new(db.clone()),
            points: SeaOrmPointsRepository::new(db.clone()),
            shops: SeaOrmShopRepository::new(db),
        }
    }

    /// Concrete shop store, for seeding and administration.
    pub fn shop_store(&self) -> &SeaOrmShopRepository {
        &self.shops
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn reservations(&self) -> &dyn ReservationRepository {
        &self.reservations
    }

    fn points(&self) -> &dyn PointsRepository {
        &self.points
    }

    fn shops(&self) -> &dyn ShopRepository {
        &self.shops
    }
}
