use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use super::with_deadline;
use crate::engine::projector::{CalendarDay, CalendarFilter, CapacityOverview};
use crate::error::AppError;
use crate::models::booking::{BookingStatus, DeliveryBooking, DeliveryType, TimeSlot, TimeWindow};
use crate::models::capacity::CapacityRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calendar", get(calendar))
        .route("/capacity", get(capacity))
        .route("/capacity/:date/:slot", put(set_capacity))
        .route("/conflicts", get(conflicts))
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub status: Option<BookingStatus>,
    pub slot: Option<TimeSlot>,
    pub distributor_id: Option<Uuid>,
    pub delivery_type: Option<DeliveryType>,
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub slot: Option<TimeSlot>,
}

#[derive(Deserialize)]
pub struct SetCapacityRequest {
    pub max_bookings: u32,
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub exclude: Option<Uuid>,
}

async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<BTreeMap<NaiveDate, CalendarDay>>, AppError> {
    let filter = CalendarFilter {
        status: query.status,
        slot: query.slot,
        distributor_id: query.distributor_id,
        delivery_type: query.delivery_type,
    };
    Ok(Json(state.scheduler.calendar(
        query.date_from,
        query.date_to,
        &filter,
    )?))
}

async fn capacity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CapacityQuery>,
) -> Result<Json<CapacityOverview>, AppError> {
    let overview = with_deadline(
        &state,
        state
            .scheduler
            .capacity_overview(query.date_from, query.date_to, query.slot),
    )
    .await?;
    Ok(Json(overview))
}

async fn set_capacity(
    State(state): State<Arc<AppState>>,
    Path((date, slot)): Path<(NaiveDate, TimeSlot)>,
    Json(payload): Json<SetCapacityRequest>,
) -> Result<Json<CapacityRecord>, AppError> {
    let record = with_deadline(
        &state,
        state.scheduler.set_capacity(date, slot, payload.max_bookings),
    )
    .await?;
    Ok(Json(record))
}

async fn conflicts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictQuery>,
) -> Result<Json<Vec<DeliveryBooking>>, AppError> {
    let window = TimeWindow {
        start: query.start,
        end: query.end,
    };
    Ok(Json(state.scheduler.find_overlapping(
        query.date,
        &window,
        query.exclude,
    )?))
}
