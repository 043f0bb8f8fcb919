use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    ReadyForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::ReadyForDelivery
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub store_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreLocation {
    pub id: Uuid,
    pub name: String,
    pub default_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Distributor {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}
