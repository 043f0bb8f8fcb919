use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    EnRoute,
    Arrived,
    Delivering,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub distributor_id: Uuid,
    pub status: TrackingStatus,
    pub location: Option<GeoPoint>,
    pub progress_percentage: u8,
    pub notes: Vec<String>,
    /// First location fix; progress is measured from here.
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingRecord {
    pub fn seed(booking_id: Uuid, distributor_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            distributor_id,
            status: TrackingStatus::EnRoute,
            location: None,
            progress_percentage: 0,
            notes: Vec::new(),
            started_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
