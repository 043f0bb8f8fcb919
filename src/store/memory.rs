use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ChangeSet, ScheduleStore, StoreError};
use crate::models::booking::DeliveryBooking;
use crate::models::capacity::{CapacityRecord, SlotKey};
use crate::models::tracking::TrackingRecord;

#[derive(Default)]
pub struct InMemoryStore {
    bookings: DashMap<Uuid, DeliveryBooking>,
    order_index: DashMap<Uuid, Vec<Uuid>>,
    tokens: DashMap<String, Uuid>,
    capacity: DashMap<SlotKey, CapacityRecord>,
    tracking: DashMap<Uuid, TrackingRecord>,
    tracking_index: DashMap<Uuid, Uuid>,
    commit_lock: Mutex<()>,
    fail_next_commit: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Overwrites a ledger row outside of any engine call. Used to simulate drift.
    pub fn put_capacity_raw(&self, record: CapacityRecord) {
        self.capacity.insert(record.key(), record);
    }

    fn apply_booking(&self, booking: DeliveryBooking) {
        let id = booking.id;
        let order_id = booking.order_id;
        let token = booking.confirmation_token.clone();

        let previous = self.bookings.insert(id, booking);
        match previous {
            Some(old) => {
                if let Some(old_token) = old.confirmation_token
                    && token.as_deref() != Some(old_token.as_str())
                {
                    self.tokens.remove(&old_token);
                }
            }
            None => self.order_index.entry(order_id).or_default().push(id),
        }

        if let Some(token) = token {
            self.tokens.insert(token, id);
        }
    }
}

impl ScheduleStore for InMemoryStore {
    fn booking(&self, id: Uuid) -> Result<Option<DeliveryBooking>, StoreError> {
        Ok(self.bookings.get(&id).map(|entry| entry.value().clone()))
    }

    fn booking_by_token(&self, token: &str) -> Result<Option<DeliveryBooking>, StoreError> {
        let id = match self.tokens.get(token) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.booking(id)
    }

    fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<DeliveryBooking>, StoreError> {
        let ids = self
            .order_index
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.bookings.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    fn bookings_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryBooking>, StoreError> {
        Ok(self
            .bookings
            .iter()
            .filter(|entry| {
                let date = entry.value().scheduled_date;
                date >= from && date <= to
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn capacity(&self, key: SlotKey) -> Result<Option<CapacityRecord>, StoreError> {
        Ok(self.capacity.get(&key).map(|entry| entry.value().clone()))
    }

    fn capacities_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CapacityRecord>, StoreError> {
        let mut rows: Vec<CapacityRecord> = self
            .capacity
            .iter()
            .filter(|entry| entry.key().date >= from && entry.key().date <= to)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(CapacityRecord::key);
        Ok(rows)
    }

    fn tracking(&self, id: Uuid) -> Result<Option<TrackingRecord>, StoreError> {
        Ok(self.tracking.get(&id).map(|entry| entry.value().clone()))
    }

    fn tracking_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<TrackingRecord>, StoreError> {
        let id = match self.tracking_index.get(&booking_id) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.tracking(id)
    }

    fn booking_count(&self) -> Result<usize, StoreError> {
        Ok(self.bookings.len())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("commit lock poisoned".to_string()))?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        for booking in changes.bookings {
            self.apply_booking(booking);
        }
        for record in changes.capacity {
            self.capacity.insert(record.key(), record);
        }
        for record in changes.tracking {
            self.tracking_index.insert(record.booking_id, record.id);
            self.tracking.insert(record.id, record);
        }

        Ok(())
    }
}
