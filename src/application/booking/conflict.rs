//! Capacity and overlap checks for a candidate reservation
//!
//! Pure: the caller loads the shop's active reservations for the date while
//! holding the slot lock and hands them in.

use std::collections::HashSet;

use uuid::Uuid;

use crate::domain::{Reservation, Shop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResult {
    Clear,
    /// The exact start slot already holds `capacity` active bookings
    CapacityExceeded { booked: usize, capacity: usize },
    /// An active booking of a shared exclusive service overlaps in time
    Overlap { conflicting_id: Uuid },
}

impl ConflictResult {
    pub fn is_clear(&self) -> bool {
        matches!(self, ConflictResult::Clear)
    }

    pub fn describe(&self) -> String {
        match self {
            ConflictResult::Clear => "slot is free".to_string(),
            ConflictResult::CapacityExceeded { booked, capacity } => {
                format!("slot is full ({booked}/{capacity} booked)")
            }
            ConflictResult::Overlap { conflicting_id } => {
                format!("overlaps reservation {conflicting_id} on an exclusive service")
            }
        }
    }
}

pub struct ConflictDetector;

impl ConflictDetector {
    /// Check `candidate` against `existing`.
    ///
    /// `existing` may contain reservations in any status and on any date;
    /// only active ones on the candidate's date count. `exclusive_services`
    /// lists the service ids served on a single resource.
    pub fn check(
        candidate: &Reservation,
        existing: &[Reservation],
        shop: &Shop,
        exclusive_services: &HashSet<Uuid>,
    ) -> ConflictResult {
        let same_day: Vec<&Reservation> = existing
            .iter()
            .filter(|r| {
                r.id != candidate.id
                    && r.shop_id == candidate.shop_id
                    && r.reservation_date == candidate.reservation_date
                    && r.is_active()
            })
            .collect();

        let capacity = shop.slot_capacity.max(0) as usize;
        let booked = same_day
            .iter()
            .filter(|r| r.reservation_time == candidate.reservation_time)
            .count();
        if booked >= capacity {
            return ConflictResult::CapacityExceeded { booked, capacity };
        }

        let wanted: Vec<&Uuid> = candidate
            .service_ids
            .iter()
            .filter(|id| exclusive_services.contains(id))
            .collect();
        if wanted.is_empty() {
            return ConflictResult::Clear;
        }

        let (start, end) = (candidate.starts_at(), candidate.ends_at());
        for other in same_day {
            let shares_resource = other.service_ids.iter().any(|id| wanted.contains(&id));
            if shares_resource && other.overlaps(start, end) {
                return ConflictResult::Overlap {
                    conflicting_id: other.id,
                };
            }
        }

        ConflictResult::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DepositStatus, ReservationStatus};
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn shop(capacity: i32) -> Shop {
        Shop {
            id: Uuid::from_u128(1),
            name: "Hongdae Lash".into(),
            slot_capacity: capacity,
            slot_interval_minutes: 30,
            opening_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            auto_confirm: true,
            is_active: true,
        }
    }

    fn booking(h: u32, m: u32, minutes: i32, services: &[u128]) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::new_v4(),
            shop_id: Uuid::from_u128(1),
            customer_id: Uuid::new_v4(),
            service_ids: services.iter().map(|s| Uuid::from_u128(*s)).collect(),
            reservation_date: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            reservation_time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            duration_minutes: minutes,
            status: ReservationStatus::Confirmed,
            total_amount: 30_000,
            deposit_amount: 0,
            deposit_status: DepositStatus::NotRequired,
            remaining_amount: 30_000,
            points_used: 0,
            points_usage_id: None,
            points_earned: 0,
            special_requests: None,
            cancellation_reason: None,
            requested_at: now,
            confirmed_at: Some(now),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            no_show_at: None,
            review_deadline: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn exclusive(ids: &[u128]) -> HashSet<Uuid> {
        ids.iter().map(|i| Uuid::from_u128(*i)).collect()
    }

    #[test]
    fn empty_day_is_clear() {
        let result = ConflictDetector::check(&booking(14, 0, 60, &[10]), &[], &shop(1), &exclusive(&[]));
        assert_eq!(result, ConflictResult::Clear);
    }

    #[test]
    fn capacity_counts_only_the_exact_slot() {
        let existing = vec![booking(14, 0, 60, &[10]), booking(14, 30, 60, &[11])];
        let candidate = booking(14, 0, 60, &[12]);

        let result = ConflictDetector::check(&candidate, &existing, &shop(2), &exclusive(&[]));
        assert_eq!(result, ConflictResult::Clear);

        let result = ConflictDetector::check(&candidate, &existing, &shop(1), &exclusive(&[]));
        assert_eq!(
            result,
            ConflictResult::CapacityExceeded {
                booked: 1,
                capacity: 1
            }
        );
    }

    #[test]
    fn inactive_reservations_free_their_capacity() {
        let mut cancelled = booking(14, 0, 60, &[10]);
        cancelled.status = ReservationStatus::CancelledByUser;
        let mut no_show = booking(14, 0, 60, &[10]);
        no_show.status = ReservationStatus::NoShow;

        let result = ConflictDetector::check(
            &booking(14, 0, 60, &[10]),
            &[cancelled, no_show],
            &shop(1),
            &exclusive(&[10]),
        );
        assert!(result.is_clear());
    }

    #[test]
    fn in_progress_still_occupies_the_slot() {
        let mut started = booking(14, 0, 60, &[10]);
        started.status = ReservationStatus::InProgress;
        let result =
            ConflictDetector::check(&booking(14, 0, 60, &[11]), &[started], &shop(1), &exclusive(&[]));
        assert!(matches!(result, ConflictResult::CapacityExceeded { .. }));
    }

    #[test]
    fn overlapping_exclusive_service_conflicts() {
        let existing = booking(14, 0, 90, &[10]);
        let result = ConflictDetector::check(
            &booking(15, 0, 60, &[10]),
            &[existing.clone()],
            &shop(3),
            &exclusive(&[10]),
        );
        assert_eq!(
            result,
            ConflictResult::Overlap {
                conflicting_id: existing.id
            }
        );
    }

    #[test]
    fn back_to_back_is_not_an_overlap() {
        let existing = booking(14, 0, 60, &[10]);
        let result = ConflictDetector::check(
            &booking(15, 0, 60, &[10]),
            &[existing],
            &shop(3),
            &exclusive(&[10]),
        );
        assert!(result.is_clear());
    }

    #[test]
    fn non_exclusive_services_may_overlap() {
        let existing = booking(14, 0, 90, &[10]);
        let result = ConflictDetector::check(
            &booking(14, 30, 60, &[10]),
            &[existing],
            &shop(3),
            &exclusive(&[]),
        );
        assert!(result.is_clear());
    }

    #[test]
    fn other_dates_are_ignored() {
        let mut tomorrow = booking(14, 0, 60, &[10]);
        tomorrow.reservation_date = NaiveDate::from_ymd_opt(2025, 1, 21).unwrap();
        let result = ConflictDetector::check(
            &booking(14, 0, 60, &[10]),
            &[tomorrow],
            &shop(1),
            &exclusive(&[10]),
        );
        assert!(result.is_clear());
    }
}
