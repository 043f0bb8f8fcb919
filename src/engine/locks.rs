use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// What a scheduling call serializes on. Orders sort before days so every caller
/// acquires in the same global order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Order(Uuid),
    Day(NaiveDate),
}

pub struct HeldLocks {
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl HeldLocks {
    pub fn covers(&self, key: LockKey) -> bool {
        self.keys.binary_search(&key).is_ok()
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            self.table
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[derive(Default)]
pub struct LockTable {
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> HeldLocks {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut held = HeldLocks {
            guards: Vec::with_capacity(keys.len()),
            keys,
            table: self.locks.clone(),
        };
        for index in 0..held.keys.len() {
            let key = held.keys[index];
            let lock = self.locks.entry(key).or_default().value().clone();
            held.guards.push(lock.lock_owned().await);
        }

        held
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_day_is_serialized() {
        let table = Arc::new(LockTable::new());
        let day = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let held = table.acquire([day]).await;
        let contender = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire([day]).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        let second = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
        assert!(second.covers(day));
    }

    #[tokio::test]
    async fn different_days_do_not_block() {
        let table = LockTable::new();
        let first = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let second = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());

        let _a = table.acquire([first]).await;
        let b = tokio::time::timeout(Duration::from_secs(1), table.acquire([second])).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn duplicate_keys_are_locked_once() {
        let table = LockTable::new();
        let day = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let order = LockKey::Order(Uuid::new_v4());

        let held = tokio::time::timeout(
            Duration::from_secs(1),
            table.acquire([day, order, day]),
        )
        .await
        .unwrap();
        assert!(held.covers(day));
        assert!(held.covers(order));
    }

    #[tokio::test]
    async fn released_keys_leave_no_entries() {
        let table = LockTable::new();
        for _ in 0..200 {
            let held = table.acquire([LockKey::Order(Uuid::new_v4())]).await;
            assert_eq!(table.locks.len(), 1);
            drop(held);
        }
        assert_eq!(table.locks.len(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_is_queued() {
        let table = Arc::new(LockTable::new());
        let day = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let held = table.acquire([day]).await;
        let contender = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire([day]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(table.locks.len(), 1);

        let second = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
        drop(second);
        assert_eq!(table.locks.len(), 0);
    }

    #[tokio::test]
    async fn abandoned_acquisition_is_pruned() {
        let table = LockTable::new();
        let day = LockKey::Day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let order = LockKey::Order(Uuid::new_v4());

        let held = table.acquire([day]).await;
        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            table.acquire([order, day]),
        )
        .await;
        assert!(pending.is_err());

        drop(held);
        assert_eq!(table.locks.len(), 0);
    }
}
