use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::capacity::SlotKey;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Delivered,
    Missed,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    /// Active bookings occupy their window and count against slot capacity.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Rescheduled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Delivered
                | BookingStatus::Missed
                | BookingStatus::Cancelled
                | BookingStatus::Rescheduled
        )
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        matches!(
            (self, next),
            (Scheduled, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Delivered)
                | (Scheduled | Confirmed, Cancelled)
                | (Scheduled | Confirmed | InProgress, Missed)
                | (Scheduled | Confirmed, Rescheduled)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Missed => "missed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Evening];

    pub fn containing(start: NaiveTime) -> Self {
        match start.hour() {
            0..=11 => TimeSlot::Morning,
            12..=16 => TimeSlot::Afternoon,
            _ => TimeSlot::Evening,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Half-open time window `[start, end)` on the booking's scheduled date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.start >= self.end {
            return Err(AppError::InvalidTimeWindow(format!(
                "window start {} must be before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    #[default]
    Standard,
    Express,
    Scheduled,
    Pickup,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Fee in minor units of the base currency and of the local currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeliveryFee {
    pub amount: i64,
    pub amount_local: i64,
}

impl std::ops::AddAssign for DeliveryFee {
    fn add_assign(&mut self, other: Self) {
        self.amount += other.amount;
        self.amount_local += other.amount_local;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContactSnapshot {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingNote {
    pub at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryBooking {
    pub id: Uuid,
    pub order_id: Uuid,
    pub distributor_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub window: TimeWindow,
    pub slot: TimeSlot,
    pub delivery_type: DeliveryType,
    pub priority: Priority,
    pub address: String,
    pub contact: ContactSnapshot,
    pub instructions: Option<String>,
    pub fee: DeliveryFee,
    pub status: BookingStatus,
    pub confirmation_token: Option<String>,
    pub rescheduled_from: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub reschedule_reason: Option<String>,
    pub notes: Vec<BookingNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryBooking {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.scheduled_date, self.slot)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn append_note(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.notes.push(BookingNote {
            at,
            text: text.into(),
        });
    }

    pub fn append_instructions(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.instructions = match self.instructions.take() {
            Some(existing) if !existing.trim().is_empty() => Some(format!("{existing}\n{text}")),
            _ => Some(text.to_string()),
        };
    }
}

/// Partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub scheduled_date: Option<NaiveDate>,
    pub window: Option<TimeWindow>,
    pub slot: Option<TimeSlot>,
    #[serde(default, deserialize_with = "present")]
    pub distributor_id: Option<Option<Uuid>>,
    pub delivery_type: Option<DeliveryType>,
    pub priority: Option<Priority>,
    pub address: Option<String>,
    pub contact: Option<ContactSnapshot>,
    #[serde(default, deserialize_with = "present")]
    pub instructions: Option<Option<String>>,
    pub fee: Option<DeliveryFee>,
    pub status: Option<BookingStatus>,
    pub notes: Option<String>,
}

impl BookingPatch {
    pub fn touches_schedule(&self) -> bool {
        self.scheduled_date.is_some() || self.window.is_some() || self.slot.is_some()
    }

    pub fn is_notes_only(&self) -> bool {
        self.notes.is_some()
            && !self.touches_schedule()
            && self.distributor_id.is_none()
            && self.delivery_type.is_none()
            && self.priority.is_none()
            && self.address.is_none()
            && self.contact.is_none()
            && self.instructions.is_none()
            && self.fee.is_none()
            && self.status.is_none()
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
