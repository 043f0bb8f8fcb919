use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::models::booking::DeliveryBooking;
use crate::models::capacity::{CapacityRecord, SlotKey};
use crate::observability::metrics::Metrics;
use crate::store::{ChangeSet, ScheduleStore, StoreError};

/// Per (date, slot) capacity rows. The cached `booked` counter is advisory; callers
/// reconcile it against live bookings before gating on it.
pub struct CapacityLedger {
    store: Arc<dyn ScheduleStore>,
    default_max: u32,
    metrics: Metrics,
}

impl CapacityLedger {
    pub fn new(store: Arc<dyn ScheduleStore>, default_max: u32, metrics: Metrics) -> Self {
        Self {
            store,
            default_max,
            metrics,
        }
    }

    pub fn default_max(&self) -> u32 {
        self.default_max
    }

    /// The row for `key` as it will look after `changes` commit, staging a
    /// default row when none exists yet.
    pub fn get_or_create(
        &self,
        key: SlotKey,
        changes: &mut ChangeSet,
    ) -> Result<CapacityRecord, StoreError> {
        if let Some(staged) = changes.staged_capacity(key) {
            return Ok(staged.clone());
        }
        if let Some(existing) = self.store.capacity(key)? {
            return Ok(existing);
        }

        let record = CapacityRecord::new(key, self.default_max);
        changes.put_capacity(record.clone());
        Ok(record)
    }

    pub fn peek(&self, key: SlotKey) -> Result<CapacityRecord, StoreError> {
        Ok(self
            .store
            .capacity(key)?
            .unwrap_or_else(|| CapacityRecord::new(key, self.default_max)))
    }

    /// Stages `booked += delta`. The counter never goes below zero.
    pub fn adjust(
        &self,
        key: SlotKey,
        delta: i32,
        changes: &mut ChangeSet,
    ) -> Result<CapacityRecord, StoreError> {
        let mut record = self.get_or_create(key, changes)?;
        let next = i64::from(record.booked) + i64::from(delta);

        record.booked = match u32::try_from(next) {
            Ok(booked) => booked,
            Err(_) if next < 0 => {
                warn!(
                    date = %key.date,
                    slot = %key.slot,
                    booked = record.booked,
                    delta,
                    "capacity ledger would go negative; clamping at zero"
                );
                self.metrics.capacity_drift_total.inc();
                0
            }
            Err(_) => u32::MAX,
        };
        record.updated_at = Utc::now();

        changes.put_capacity(record.clone());
        Ok(record)
    }

    pub fn reconcile(
        &self,
        key: SlotKey,
        live: u32,
        changes: &mut ChangeSet,
    ) -> Result<CapacityRecord, StoreError> {
        let mut record = self.get_or_create(key, changes)?;
        if record.booked != live {
            warn!(
                date = %key.date,
                slot = %key.slot,
                cached = record.booked,
                live,
                "inconsistent capacity state; using recomputed count"
            );
            self.metrics.capacity_drift_total.inc();
            record.booked = live;
            record.updated_at = Utc::now();
            changes.put_capacity(record.clone());
        }
        Ok(record)
    }

    pub fn set_max(
        &self,
        key: SlotKey,
        max_bookings: u32,
        changes: &mut ChangeSet,
    ) -> Result<CapacityRecord, StoreError> {
        let mut record = self.get_or_create(key, changes)?;
        record.max_bookings = max_bookings;
        record.updated_at = Utc::now();
        changes.put_capacity(record.clone());
        Ok(record)
    }

    pub fn summarize(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CapacityRecord>, StoreError> {
        self.store.capacities_between(from, to)
    }
}

pub fn count_active<'a>(
    bookings: impl IntoIterator<Item = &'a DeliveryBooking>,
    key: SlotKey,
) -> u32 {
    let count = bookings
        .into_iter()
        .filter(|b| b.is_active() && b.slot_key() == key)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::TimeSlot;
    use crate::store::InMemoryStore;

    fn key() -> SlotKey {
        SlotKey::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), TimeSlot::Morning)
    }

    fn ledger(store: Arc<InMemoryStore>) -> (CapacityLedger, Metrics) {
        let metrics = Metrics::new();
        (CapacityLedger::new(store, 10, metrics.clone()), metrics)
    }

    #[test]
    fn missing_row_is_created_with_default_max() {
        let store = Arc::new(InMemoryStore::new());
        let (ledger, _) = ledger(store.clone());

        let mut changes = ChangeSet::new();
        let record = ledger.adjust(key(), 1, &mut changes).unwrap();
        assert_eq!(record.max_bookings, 10);
        assert_eq!(record.booked, 1);
        assert_eq!(record.available(), 9);

        assert!(store.capacity(key()).unwrap().is_none());
        store.commit(changes).unwrap();
        assert_eq!(store.capacity(key()).unwrap().unwrap().booked, 1);
    }

    #[test]
    fn adjustments_accumulate_within_one_change_set() {
        let store = Arc::new(InMemoryStore::new());
        let (ledger, _) = ledger(store);

        let mut changes = ChangeSet::new();
        ledger.adjust(key(), 1, &mut changes).unwrap();
        ledger.adjust(key(), 1, &mut changes).unwrap();
        let record = ledger.adjust(key(), -1, &mut changes).unwrap();
        assert_eq!(record.booked, 1);
        assert_eq!(changes.capacity.len(), 1);
    }

    #[test]
    fn decrement_clamps_at_zero_and_counts_drift() {
        let store = Arc::new(InMemoryStore::new());
        let (ledger, metrics) = ledger(store);

        let mut changes = ChangeSet::new();
        let record = ledger.adjust(key(), -1, &mut changes).unwrap();
        assert_eq!(record.booked, 0);
        assert_eq!(metrics.capacity_drift_total.get(), 1);
    }

    #[test]
    fn reconcile_overwrites_stale_cache() {
        let store = Arc::new(InMemoryStore::new());
        store.put_capacity_raw(CapacityRecord {
            booked: 7,
            ..CapacityRecord::new(key(), 10)
        });
        let (ledger, metrics) = ledger(store);

        let mut changes = ChangeSet::new();
        let record = ledger.reconcile(key(), 2, &mut changes).unwrap();
        assert_eq!(record.booked, 2);
        assert_eq!(metrics.capacity_drift_total.get(), 1);
        assert_eq!(changes.staged_capacity(key()).unwrap().booked, 2);
    }

    #[test]
    fn reconcile_in_sync_stages_nothing_for_existing_rows() {
        let store = Arc::new(InMemoryStore::new());
        store.put_capacity_raw(CapacityRecord {
            booked: 2,
            ..CapacityRecord::new(key(), 10)
        });
        let (ledger, metrics) = ledger(store);

        let mut changes = ChangeSet::new();
        ledger.reconcile(key(), 2, &mut changes).unwrap();
        assert!(changes.is_empty());
        assert_eq!(metrics.capacity_drift_total.get(), 0);
    }

    #[test]
    fn override_keeps_booked_count() {
        let store = Arc::new(InMemoryStore::new());
        store.put_capacity_raw(CapacityRecord {
            booked: 3,
            ..CapacityRecord::new(key(), 10)
        });
        let (ledger, _) = ledger(store);

        let mut changes = ChangeSet::new();
        let record = ledger.set_max(key(), 2, &mut changes).unwrap();
        assert_eq!(record.booked, 3);
        assert_eq!(record.available(), 0);
    }
}
