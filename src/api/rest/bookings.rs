use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::with_deadline;
use crate::engine::scheduling::{
    BookingFilter, NewBooking, Page, PageRequest, RescheduleOutcome, RescheduleRequest,
};
use crate::error::AppError;
use crate::models::booking::{BookingPatch, BookingStatus, DeliveryBooking, DeliveryType, TimeSlot};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/confirm", post(confirm_booking))
        .route("/bookings/:id", get(get_booking).patch(update_booking))
        .route("/bookings/:id/reschedule", post(reschedule_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/orders/:id/bookings", get(order_history))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub slot: Option<TimeSlot>,
    pub distributor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub delivery_type: Option<DeliveryType>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
    pub notes: Option<String>,
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<DeliveryBooking>>, AppError> {
    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(state.config.default_page_size),
    };
    let filter = BookingFilter {
        date_from: query.date_from,
        date_to: query.date_to,
        status: query.status,
        slot: query.slot,
        distributor_id: query.distributor_id,
        order_id: query.order_id,
        delivery_type: query.delivery_type,
    };

    Ok(Json(state.scheduler.list(&filter, page)?))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBooking>,
) -> Result<(StatusCode, Json<DeliveryBooking>), AppError> {
    let booking = with_deadline(&state, state.scheduler.create(payload)).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryBooking>, AppError> {
    Ok(Json(state.scheduler.get(id)?))
}

async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<DeliveryBooking>, AppError> {
    let booking = with_deadline(&state, state.scheduler.update(id, patch)).await?;
    Ok(Json(booking))
}

async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<RescheduleOutcome>, AppError> {
    let outcome = with_deadline(&state, state.scheduler.reschedule(id, payload)).await?;
    Ok(Json(outcome))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<DeliveryBooking>, AppError> {
    let booking = with_deadline(&state, state.scheduler.cancel(id, payload.reason)).await?;
    Ok(Json(booking))
}

async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<DeliveryBooking>, AppError> {
    let booking = with_deadline(
        &state,
        state.scheduler.confirm(&payload.token, payload.notes),
    )
    .await?;
    Ok(Json(booking))
}

async fn order_history(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryBooking>>, AppError> {
    Ok(Json(state.scheduler.history(order_id)?))
}
