//! Shop slot configuration (read-only for the booking engine)

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-shop capacity and operating hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: Uuid,
    pub name: String,
    /// How many customers can start in the same slot
    pub slot_capacity: i32,
    /// Bookable start times are multiples of this many minutes past midnight
    pub slot_interval_minutes: i32,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    /// Confirm immediately when no deposit is due
    pub auto_confirm: bool,
    pub is_active: bool,
}

impl Shop {
    pub fn is_aligned(&self, time: NaiveTime) -> bool {
        let interval = self.slot_interval_minutes.max(1) as u32;
        time.second() == 0 && (time.hour() * 60 + time.minute()) % interval == 0
    }

    /// Whether `[start, end)` sits inside operating hours of a single day.
    pub fn is_within_hours(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start.date() == end.date()
            && start < end
            && start.time() >= self.opening_time
            && end.time() <= self.closing_time
    }
}


/// A bookable service offered by a shop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopService {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: i64,
    pub deposit_amount: i64,
    /// Served on a single resource (one chair, one room); bookings of the
    /// same exclusive service may not overlap in time
    pub exclusive: bool,
    pub is_active: bool,
}
