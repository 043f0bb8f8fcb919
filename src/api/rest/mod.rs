pub mod bookings;
pub mod directory;
pub mod schedule;
pub mod tracking;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(bookings::router())
        .merge(schedule::router())
        .merge(tracking::router())
        .merge(directory::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
}

/// Runs an engine call under the request deadline. A call that times out is
/// dropped before its commit, so nothing partial is left behind.
pub(crate) async fn with_deadline<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(state.config.request_timeout, call)
        .await
        .map_err(|_| AppError::TransientFailure("request deadline exceeded".to_string()))?
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    bookings: usize,
    orders: usize,
    distributors: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        bookings: state.store.booking_count()?,
        orders: state.directory.order_count(),
        distributors: state.directory.distributor_count(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
