use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::pricing::{self, Quote, RateTable};
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::driver::VehicleType;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/quote", get(quote_for_courier))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub rates: Option<RateTable>,
}

#[derive(Deserialize)]
pub struct QuoteQuery {
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        rates: payload.rates,
        created_at: Utc::now(),
    };

    state.couriers.insert(courier.id, courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let couriers = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(couriers)
}

/// Price preview for the customer app, computed from the same table the
/// request creation path uses.
async fn quote_for_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Quote>, AppError> {
    if query.distance_km <= 0.0 {
        return Err(AppError::BadRequest(
            "distance must be positive".to_string(),
        ));
    }

    let courier = state
        .couriers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

    let quote = pricing::quote(courier.rates.as_ref(), query.vehicle_type, query.distance_km);
    Ok(Json(quote))
}
