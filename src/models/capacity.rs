use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::booking::TimeSlot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub slot: TimeSlot,
}

impl SlotKey {
    pub fn new(date: NaiveDate, slot: TimeSlot) -> Self {
        Self { date, slot }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityRecord {
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub max_bookings: u32,
    pub booked: u32,
    pub updated_at: DateTime<Utc>,
}

impl CapacityRecord {
    pub fn new(key: SlotKey, max_bookings: u32) -> Self {
        Self {
            date: key.date,
            slot: key.slot,
            max_bookings,
            booked: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.slot)
    }

    pub fn available(&self) -> u32 {
        self.max_bookings.saturating_sub(self.booked)
    }

    /// Occupancy for display, clamped to `[0, 100]` even when overbooked.
    pub fn percentage(&self) -> f64 {
        if self.max_bookings == 0 {
            return if self.booked == 0 { 0.0 } else { 100.0 };
        }
        (self.booked as f64 / self.max_bookings as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(max: u32, booked: u32) -> CapacityRecord {
        let key = SlotKey::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), TimeSlot::Morning);
        CapacityRecord {
            booked,
            ..CapacityRecord::new(key, max)
        }
    }

    #[test]
    fn available_never_negative() {
        assert_eq!(record(2, 1).available(), 1);
        assert_eq!(record(2, 5).available(), 0);
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(record(4, 1).percentage(), 25.0);
        assert_eq!(record(2, 5).percentage(), 100.0);
        assert_eq!(record(0, 0).percentage(), 0.0);
        assert_eq!(record(0, 1).percentage(), 100.0);
    }
}
