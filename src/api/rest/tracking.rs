use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::with_deadline;
use crate::engine::tracking::{LiveTracking, TrackingUpdate};
use crate::error::AppError;
use crate::models::tracking::TrackingRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/live", get(live_tracking))
        .route("/tracking/:id", patch(update_tracking))
}

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub date: NaiveDate,
    pub distributor_id: Option<Uuid>,
}

async fn live_tracking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
) -> Result<Json<LiveTracking>, AppError> {
    Ok(Json(
        state.scheduler.live_view(query.date, query.distributor_id)?,
    ))
}

async fn update_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<TrackingUpdate>,
) -> Result<Json<TrackingRecord>, AppError> {
    let record = with_deadline(&state, state.scheduler.update_tracking(id, update)).await?;
    Ok(Json(record))
}
