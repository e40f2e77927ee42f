//! Shared fixtures for the integration tests
//!
//! An engine over the in-memory store with a manual clock, one shop open
//! 10:00-20:00 (Asia/Seoul offset) and a few services.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use beauty_booking::application::ports::{CaptureStatus, GatewayError, PaymentGateway};
use beauty_booking::application::CreateReservationRequest;
use beauty_booking::config::AppConfig;
use beauty_booking::domain::{Shop, ShopService};
use beauty_booking::shared::clock::{from_local, ManualClock};
use beauty_booking::{BookingEngine, InMemoryRepositoryProvider};

pub const CUT_PRICE: i64 = 30_000;
pub const NAIL_PRICE: i64 = 50_000;
pub const NAIL_DEPOSIT: i64 = 10_000;

/// Records every refund; captures are left to the webhook.
#[derive(Default)]
pub struct RecordingGateway {
    pub refunds: Mutex<Vec<(Uuid, i64)>>,
}

impl RecordingGateway {
    pub fn refunds(&self) -> Vec<(Uuid, i64)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn capture_deposit(
        &self,
        _reservation_id: Uuid,
        _amount: i64,
    ) -> Result<CaptureStatus, GatewayError> {
        Ok(CaptureStatus::Deferred)
    }

    async fn refund(&self, reservation_id: Uuid, amount: i64) -> Result<(), GatewayError> {
        self.refunds.lock().unwrap().push((reservation_id, amount));
        Ok(())
    }
}

pub struct Fixture {
    pub engine: BookingEngine,
    pub store: Arc<InMemoryRepositoryProvider>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RecordingGateway>,
    pub config: AppConfig,
    pub shop: Shop,
    /// 60 min, no deposit
    pub cut: ShopService,
    /// 90 min, deposit required
    pub nails: ShopService,
    /// 60 min, one chair
    pub spa: ShopService,
}

pub fn slot_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// UTC instant of a shop-local wall time on the slot date.
pub fn local(h: u32, m: u32) -> DateTime<Utc> {
    let config = AppConfig::default();
    from_local(slot_date().and_time(at(h, m)), config.booking.shop_offset())
}

impl Fixture {
    pub fn new(slot_capacity: i32) -> Self {
        Self::with_config(slot_capacity, AppConfig::default())
    }

    pub fn with_config(slot_capacity: i32, config: AppConfig) -> Self {
        let store = Arc::new(InMemoryRepositoryProvider::new());
        // The day before the slot, 09:00 local.
        let clock = Arc::new(ManualClock::new(local(9, 0) - chrono::Duration::days(1)));
        let gateway = Arc::new(RecordingGateway::default());

        let shop = Shop {
            id: Uuid::new_v4(),
            name: "Seongsu Beauty Lab".to_string(),
            slot_capacity,
            slot_interval_minutes: 30,
            opening_time: at(10, 0),
            closing_time: at(20, 0),
            auto_confirm: true,
            is_active: true,
        };
        let service = |name: &str, minutes: i32, price: i64, deposit: i64, exclusive: bool| {
            ShopService {
                id: Uuid::new_v4(),
                shop_id: shop.id,
                name: name.to_string(),
                duration_minutes: minutes,
                price,
                deposit_amount: deposit,
                exclusive,
                is_active: true,
            }
        };
        let cut = service("Haircut", 60, CUT_PRICE, 0, false);
        let nails = service("Gel nails", 90, NAIL_PRICE, NAIL_DEPOSIT, false);
        let spa = service("Head spa", 60, 80_000, 0, true);

        store.seed_shop(shop.clone());
        for s in [&cut, &nails, &spa] {
            store.seed_service(s.clone());
        }

        let engine = BookingEngine::assemble(store.clone(), clock.clone(), gateway.clone(), &config);

        Self {
            engine,
            store,
            clock,
            gateway,
            config,
            shop,
            cut,
            nails,
            spa,
        }
    }

    pub fn request(&self, service: &ShopService, h: u32, m: u32) -> CreateReservationRequest {
        CreateReservationRequest {
            shop_id: self.shop.id,
            customer_id: Uuid::new_v4(),
            service_ids: vec![service.id],
            reservation_date: slot_date(),
            reservation_time: at(h, m),
            points_to_use: 0,
            special_requests: None,
        }
    }

    pub fn set_local(&self, h: u32, m: u32) {
        self.clock.set(local(h, m));
    }
}

/// Poll until `check` holds or a second has passed; spawned gateway calls
/// run on their own tasks.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
