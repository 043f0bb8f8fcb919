pub mod memory;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::booking::DeliveryBooking;
use crate::models::capacity::{CapacityRecord, SlotKey};
use crate::models::tracking::TrackingRecord;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait ScheduleStore: Send + Sync {
    fn booking(&self, id: Uuid) -> Result<Option<DeliveryBooking>, StoreError>;

    fn booking_by_token(&self, token: &str) -> Result<Option<DeliveryBooking>, StoreError>;

    fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<DeliveryBooking>, StoreError>;

    /// Bookings scheduled within `[from, to]`, both ends inclusive.
    fn bookings_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryBooking>, StoreError>;

    fn bookings_on(&self, date: NaiveDate) -> Result<Vec<DeliveryBooking>, StoreError> {
        self.bookings_between(date, date)
    }

    fn capacity(&self, key: SlotKey) -> Result<Option<CapacityRecord>, StoreError>;

    fn capacities_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CapacityRecord>, StoreError>;

    fn tracking(&self, id: Uuid) -> Result<Option<TrackingRecord>, StoreError>;

    fn tracking_for_booking(&self, booking_id: Uuid)
        -> Result<Option<TrackingRecord>, StoreError>;

    fn booking_count(&self) -> Result<usize, StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

/// Writes staged by one engine call. Later puts for the same id or key replace earlier ones.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub bookings: Vec<DeliveryBooking>,
    pub capacity: Vec<CapacityRecord>,
    pub tracking: Vec<TrackingRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty() && self.capacity.is_empty() && self.tracking.is_empty()
    }

    pub fn put_booking(&mut self, booking: DeliveryBooking) {
        match self.bookings.iter_mut().find(|b| b.id == booking.id) {
            Some(existing) => *existing = booking,
            None => self.bookings.push(booking),
        }
    }

    pub fn staged_capacity(&self, key: SlotKey) -> Option<&CapacityRecord> {
        self.capacity.iter().find(|r| r.key() == key)
    }

    pub fn put_capacity(&mut self, record: CapacityRecord) {
        let key = record.key();
        match self.capacity.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => self.capacity.push(record),
        }
    }

    pub fn put_tracking(&mut self, record: TrackingRecord) {
        match self.tracking.iter_mut().find(|t| t.id == record.id) {
            Some(existing) => *existing = record,
            None => self.tracking.push(record),
        }
    }
}
