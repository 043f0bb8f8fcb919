use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use uuid::Uuid;

use crate::models::directory::{Distributor, Order, StoreLocation};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

pub trait OrderService: Send + Sync {
    fn deliverable_order(&self, order_id: Uuid) -> Result<Option<Order>, DirectoryError>;

    /// Sets or clears the order's delivery date, returning the previous value.
    fn set_delivery_date(
        &self,
        order_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Option<NaiveDate>, DirectoryError>;
}

pub trait StoreDirectory: Send + Sync {
    fn default_address(&self, store_id: Uuid) -> Result<Option<String>, DirectoryError>;
}

pub trait DistributorDirectory: Send + Sync {
    fn is_active_distributor(&self, user_id: Uuid) -> Result<bool, DirectoryError>;
}

#[derive(Default)]
pub struct InMemoryDirectory {
    orders: DashMap<Uuid, Order>,
    stores: DashMap<Uuid, StoreLocation>,
    distributors: DashMap<Uuid, Distributor>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Replaces an order's fields but keeps the delivery date the scheduler owns.
    pub fn upsert_order_keeping_schedule(&self, mut order: Order) -> Order {
        match self.orders.entry(order.id) {
            Entry::Occupied(mut entry) => {
                order.delivery_date = entry.get().delivery_date;
                entry.insert(order.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(order.clone());
            }
        }
        order
    }

    pub fn upsert_store(&self, store: StoreLocation) {
        self.stores.insert(store.id, store);
    }

    pub fn upsert_distributor(&self, distributor: Distributor) {
        self.distributors.insert(distributor.id, distributor);
    }

    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.orders.get(&order_id).map(|entry| entry.value().clone())
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn distributor_count(&self) -> usize {
        self.distributors.len()
    }
}

impl OrderService for InMemoryDirectory {
    fn deliverable_order(&self, order_id: Uuid) -> Result<Option<Order>, DirectoryError> {
        Ok(self
            .orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .filter(|order| order.status.is_deliverable()))
    }

    fn set_delivery_date(
        &self,
        order_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Option<NaiveDate>, DirectoryError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or(DirectoryError::OrderNotFound(order_id))?;
        Ok(std::mem::replace(&mut order.delivery_date, date))
    }
}

impl StoreDirectory for InMemoryDirectory {
    fn default_address(&self, store_id: Uuid) -> Result<Option<String>, DirectoryError> {
        Ok(self
            .stores
            .get(&store_id)
            .map(|entry| entry.value().default_address.clone()))
    }
}

impl DistributorDirectory for InMemoryDirectory {
    fn is_active_distributor(&self, user_id: Uuid) -> Result<bool, DirectoryError> {
        Ok(self
            .distributors
            .get(&user_id)
            .is_some_and(|entry| entry.value().active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::directory::OrderStatus;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            status,
            store_id: None,
            customer_name: "Ana".to_string(),
            customer_phone: None,
            shipping_address: None,
            delivery_date: None,
        }
    }

    #[test]
    fn only_deliverable_orders_are_returned() {
        let dir = InMemoryDirectory::new();
        let ready = order(OrderStatus::ReadyForDelivery);
        let pending = order(OrderStatus::Pending);
        dir.upsert_order(ready.clone());
        dir.upsert_order(pending.clone());

        assert!(dir.deliverable_order(ready.id).unwrap().is_some());
        assert!(dir.deliverable_order(pending.id).unwrap().is_none());
        assert!(dir.deliverable_order(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn inactive_distributor_is_rejected() {
        let dir = InMemoryDirectory::new();
        let id = Uuid::new_v4();
        dir.upsert_distributor(Distributor {
            id,
            name: "Luis".to_string(),
            active: false,
        });
        assert!(!dir.is_active_distributor(id).unwrap());
        assert!(!dir.is_active_distributor(Uuid::new_v4()).unwrap());
    }

    #[test]
    fn delivery_date_requires_known_order() {
        let dir = InMemoryDirectory::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert!(dir.set_delivery_date(Uuid::new_v4(), date).is_err());
    }

    #[test]
    fn feed_upsert_keeps_scheduled_date() {
        let dir = InMemoryDirectory::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let original = order(OrderStatus::ReadyForDelivery);
        let stored = dir.upsert_order_keeping_schedule(original.clone());
        assert_eq!(stored.delivery_date, None);
        dir.set_delivery_date(original.id, date).unwrap();

        let refreshed = Order {
            customer_name: "Ana Maria".to_string(),
            ..original
        };
        let stored = dir.upsert_order_keeping_schedule(refreshed);
        assert_eq!(stored.delivery_date, date);
        let current = dir.order(stored.id).unwrap();
        assert_eq!(current.customer_name, "Ana Maria");
        assert_eq!(current.delivery_date, date);
    }
}
