use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::engine::availability;
use crate::engine::tracking::PublishOutcome;
use crate::error::AppError;
use crate::models::driver::{ApprovalStatus, Availability, Driver, VehicleType};
use crate::models::location::{GeoPoint, PositionSample};
use crate::models::request::Phase;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/approval", patch(update_approval))
        .route("/drivers/:id/online", post(go_online))
        .route("/drivers/:id/offline", post(go_offline))
        .route("/drivers/:id/location", post(publish_location))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub phone: String,
    pub courier_id: Uuid,
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
}

#[derive(Deserialize)]
pub struct UpdateApprovalRequest {
    pub approval: ApprovalStatus,
}

#[derive(Deserialize)]
pub struct LocationReport {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Serialize)]
pub struct LocationPublishResponse {
    pub recorded: bool,
    pub fallback: bool,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if !state.couriers.contains_key(&payload.courier_id) {
        return Err(AppError::NotFound(format!(
            "courier {} not found",
            payload.courier_id
        )));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        courier_id: payload.courier_id,
        vehicle_type: payload.vehicle_type,
        vehicle_number: payload.vehicle_number,
        approval: ApprovalStatus::Pending,
        availability: Availability::offline(),
        registered_at: Utc::now(),
        updated_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(driver.value().clone()))
}

async fn update_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateApprovalRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.approval = payload.approval;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn go_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = availability::go_online(&state, id)?;
    Ok(Json(driver))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = availability::go_offline(&state, id)?;
    Ok(Json(driver))
}

/// Publishes a live position for the driver's current ride. When the
/// session is gone the sample is parked on the request record instead of
/// being dropped silently.
async fn publish_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationReport>,
) -> Result<Json<LocationPublishResponse>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    let ride_id = driver.availability.current_ride_id.ok_or_else(|| {
        AppError::BadRequest("driver has no active delivery to track".to_string())
    })?;

    let sample = PositionSample {
        point: GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
        heading: payload.heading,
        speed: payload.speed,
        accuracy: payload.accuracy,
        recorded_at: Utc::now(),
    };

    match state.tracker.publish(ride_id, id, sample.clone()) {
        Ok(outcome) => Ok(Json(LocationPublishResponse {
            recorded: outcome == PublishOutcome::Recorded,
            fallback: false,
        })),
        Err(AppError::NotFound(_)) => {
            if let Some(mut request) = state.requests.get_mut(&ride_id) {
                if let Phase::Active(active) = &mut request.phase {
                    if active.driver.driver_id == id {
                        active.last_known_position = Some(sample);
                    }
                }
            }
            warn!(driver_id = %id, %ride_id, "no tracking session; stored last known position");
            Ok(Json(LocationPublishResponse {
                recorded: false,
                fallback: true,
            }))
        }
        Err(err) => Err(err),
    }
}
