use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::directory::DirectoryError;
use crate::engine::projector::SlotAvailability;
use crate::models::booking::{BookingStatus, DeliveryBooking, TimeSlot};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("booking {id} is {status} and can no longer change")]
    Immutable { id: Uuid, status: BookingStatus },

    #[error("order {0} is missing or not deliverable")]
    OrderNotDeliverable(Uuid),

    #[error("order {order_id} already has active booking {booking_id}")]
    DuplicateActiveBooking { order_id: Uuid, booking_id: Uuid },

    #[error("time window overlaps {} active booking(s)", .conflicts.len())]
    SlotConflict { conflicts: Vec<DeliveryBooking> },

    #[error("{slot} on {date} is full ({booked}/{max_bookings})")]
    CapacityExceeded {
        date: NaiveDate,
        slot: TimeSlot,
        max_bookings: u32,
        booked: u32,
        suggestions: Vec<SlotAvailability>,
    },

    #[error("confirmation token is invalid or expired")]
    InvalidOrExpiredToken,

    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("temporary failure, retry: {0}")]
    TransientFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Immutable { .. } => "immutable",
            AppError::OrderNotDeliverable(_) => "order_not_deliverable",
            AppError::DuplicateActiveBooking { .. } => "duplicate_active_booking",
            AppError::SlotConflict { .. } => "slot_conflict",
            AppError::CapacityExceeded { .. } => "capacity_exceeded",
            AppError::InvalidOrExpiredToken => "invalid_or_expired_token",
            AppError::InvalidTimeWindow(_) => "invalid_time_window",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::BadRequest(_) => "bad_request",
            AppError::TransientFailure(_) => "transient_failure",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Immutable { .. }
            | AppError::DuplicateActiveBooking { .. }
            | AppError::SlotConflict { .. }
            | AppError::CapacityExceeded { .. }
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::OrderNotDeliverable(_) | AppError::InvalidTimeWindow(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidOrExpiredToken => StatusCode::GONE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TransientFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::TransientFailure(err.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        AppError::TransientFailure(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        match &self {
            AppError::SlotConflict { conflicts } => {
                body["conflicts"] = serde_json::to_value(conflicts).unwrap_or(Value::Null);
            }
            AppError::CapacityExceeded { suggestions, .. } => {
                body["suggestions"] = serde_json::to_value(suggestions).unwrap_or(Value::Null);
            }
            AppError::DuplicateActiveBooking { booking_id, .. } => {
                body["booking_id"] = json!(booking_id);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
