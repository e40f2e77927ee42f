//! Shop configuration consumed by the conflict detector

pub mod model;
pub mod repository;

pub use model::{Shop, ShopService};
pub use repository::ShopRepository;
