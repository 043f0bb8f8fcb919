use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::directory::{Distributor, Order, OrderStatus, StoreLocation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/directory/orders/:id", get(get_order).put(put_order))
        .route("/directory/stores/:id", put(put_store))
        .route("/directory/distributors/:id", put(put_distributor))
}

#[derive(Deserialize)]
pub struct OrderPayload {
    pub status: OrderStatus,
    pub store_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Deserialize)]
pub struct StorePayload {
    pub name: String,
    pub default_address: String,
}

#[derive(Deserialize)]
pub struct DistributorPayload {
    pub name: String,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    state
        .directory
        .order(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

async fn put_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrderPayload>,
) -> Json<Order> {
    let order = Order {
        id,
        status: payload.status,
        store_id: payload.store_id,
        customer_name: payload.customer_name,
        customer_phone: payload.customer_phone,
        shipping_address: payload.shipping_address,
        delivery_date: None,
    };
    Json(state.directory.upsert_order_keeping_schedule(order))
}

async fn put_store(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StorePayload>,
) -> Json<StoreLocation> {
    let store = StoreLocation {
        id,
        name: payload.name,
        default_address: payload.default_address,
    };
    state.directory.upsert_store(store.clone());
    Json(store)
}

async fn put_distributor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DistributorPayload>,
) -> Json<Distributor> {
    let distributor = Distributor {
        id,
        name: payload.name,
        active: payload.active,
    };
    state.directory.upsert_distributor(distributor.clone());
    Json(distributor)
}
