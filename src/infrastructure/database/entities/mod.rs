//! Database entities module

pub mod points_lot;
pub mod points_usage;
pub mod points_usage_draw;
pub mod reservation;
pub mod reservation_state_audit;
pub mod shop;
pub mod shop_service;

pub use points_lot::Entity as PointsLot;
pub use points_usage::Entity as PointsUsage;
pub use points_usage_draw::Entity as PointsUsageDraw;
pub use reservation::Entity as Reservation;
pub use reservation_state_audit::Entity as ReservationStateAudit;
pub use shop::Entity as Shop;
pub use shop_service::Entity as ShopService;
