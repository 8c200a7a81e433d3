use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::tracking::SessionStatus;
use crate::engine::{availability, lifecycle, pricing};
use crate::error::AppError;
use crate::models::request::{
    CancellationReason, CancelledBy, DeliveryRequest, PackageDetails, PaymentMethod, Phase,
    RideDetails,
};
use crate::models::driver::VehicleType;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/decline", post(decline_request))
        .route("/requests/:id/collect", post(start_collection))
        .route("/requests/:id/verify-pin", post(verify_pin))
        .route("/requests/:id/complete", post(complete_request))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/rating", post(rate_request))
        .route("/requests/:id/tracking", get(tracking_status))
}

#[derive(Deserialize)]
pub struct CreateRequestBody {
    pub package: PackageDetails,
    pub selected_courier: Uuid,
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub payment_method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct DriverAction {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct VerifyPinBody {
    pub driver_id: Uuid,
    pub pin: String,
}

#[derive(Deserialize)]
pub struct CompleteBody {
    pub driver_id: Uuid,
    pub proof_photo_url: String,
}

#[derive(Deserialize)]
pub struct CancelBody {
    pub cancelled_by: CancelledBy,
    pub reason: CancellationReason,
}

#[derive(Deserialize)]
pub struct RatingBody {
    pub rating: u8,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequestBody>,
) -> Result<Json<DeliveryRequest>, AppError> {
    if payload.package.pickup_address.trim().is_empty()
        || payload.package.dropoff_address.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "pickup and dropoff addresses are required".to_string(),
        ));
    }
    if payload.distance_km <= 0.0 {
        return Err(AppError::BadRequest(
            "distance must be positive".to_string(),
        ));
    }

    let courier = state
        .couriers
        .get(&payload.selected_courier)
        .ok_or_else(|| {
            AppError::NotFound(format!("courier {} not found", payload.selected_courier))
        })?;
    let quoted = pricing::quote(
        courier.rates.as_ref(),
        payload.vehicle_type,
        payload.distance_km,
    );
    drop(courier);

    let request = DeliveryRequest {
        id: Uuid::new_v4(),
        package: payload.package,
        selected_courier: payload.selected_courier,
        ride: RideDetails {
            vehicle_type: payload.vehicle_type,
            distance_km: payload.distance_km,
            quoted,
            payment_method: payload.payment_method,
        },
        phase: Phase::Searching,
        declined_drivers: Vec::new(),
        created_at: Utc::now(),
    };

    state.requests.insert(request.id, request.clone());
    state.publish_request(&request);
    state.metrics.requests_created_total.inc();
    info!(request_id = %request.id, "delivery request created");

    Ok(Json(request))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = state
        .requests
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    Ok(Json(request.value().clone()))
}

/// The accept path claims the driver first, then transitions the request
/// under its entry lock. When the request is gone by then (another driver
/// won), the claim is rolled back and the caller gets 409.
async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverAction>,
) -> Result<Json<DeliveryRequest>, AppError> {
    if !state.requests.contains_key(&id) {
        return Err(AppError::NotFound(format!("request {id} not found")));
    }

    let driver = availability::reserve(&state, payload.driver_id, id).map_err(|err| {
        state
            .metrics
            .accept_attempts_total
            .with_label_values(&["driver_busy"])
            .inc();
        err
    })?;

    let pin = lifecycle::generate_pin(&mut rand::thread_rng());
    let accepted = {
        match state.requests.get_mut(&id) {
            Some(mut request) => lifecycle::accept(&mut request, &driver, pin, Utc::now())
                .map(|()| request.clone()),
            None => Err(AppError::NotFound(format!("request {id} not found"))),
        }
    };

    match accepted {
        Ok(request) => {
            if let Some(manager) = state.managers.get(&driver.id) {
                manager.mark_accepted(id);
            }
            if !state.tracker.start(id, driver.id) {
                warn!(request_id = %id, driver_id = %driver.id, "could not start tracking for accepted request");
            }
            state.publish_request(&request);
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["won"])
                .inc();
            info!(request_id = %id, driver_id = %driver.id, "request accepted");
            Ok(Json(request))
        }
        Err(err) => {
            availability::release(&state, driver.id, id);
            if let Some(manager) = state.managers.get(&driver.id) {
                manager.mark_accepted(id);
            }
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["unavailable"])
                .inc();
            Err(err)
        }
    }
}

async fn decline_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverAction>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let driver = state
        .drivers
        .get(&payload.driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", payload.driver_id)))?;

    let request = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        lifecycle::decline(&mut request, &driver, Utc::now())?;
        request.clone()
    };

    if let Some(manager) = state.managers.get(&driver.id) {
        manager.mark_declined(id);
    }
    state.publish_request(&request);
    info!(request_id = %id, driver_id = %driver.id, "request declined");

    Ok(Json(request))
}

async fn start_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverAction>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        lifecycle::start_collection(&mut request, payload.driver_id, Utc::now())?;
        request.clone()
    };

    state.publish_request(&request);
    Ok(Json(request))
}

async fn verify_pin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyPinBody>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let verified = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        lifecycle::verify_pin(
            &mut request,
            payload.driver_id,
            &payload.pin,
            state.max_pin_attempts,
            Utc::now(),
        )
        .map(|()| request.clone())
    };

    match verified {
        Ok(request) => {
            state.publish_request(&request);
            info!(request_id = %id, "package collected; in transit");
            Ok(Json(request))
        }
        Err(err) => {
            if matches!(err, AppError::BadRequest(_)) {
                state.metrics.pin_failures_total.inc();
            }
            Err(err)
        }
    }
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteBody>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let (request, driver) = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        let driver = lifecycle::complete(
            &mut request,
            payload.driver_id,
            &payload.proof_photo_url,
            Utc::now(),
        )?;
        (request.clone(), driver)
    };

    availability::release(&state, driver.driver_id, id);
    state.tracker.stop(id);
    state.publish_request(&request);
    state.metrics.deliveries_completed_total.inc();
    info!(request_id = %id, driver_id = %driver.driver_id, "delivery completed");

    Ok(Json(request))
}

/// Cancellation is one logical unit: transition the request, release the
/// assigned driver, stop tracking. A crash between steps is healed by the
/// availability reconciler.
async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelBody>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let (request, released) = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        let released =
            lifecycle::cancel(&mut request, payload.cancelled_by, payload.reason, Utc::now())?;
        (request.clone(), released)
    };

    if let Some(driver) = &released {
        availability::release(&state, driver.driver_id, id);
        state.tracker.stop(id);
    }
    state.publish_request(&request);
    state
        .metrics
        .cancellations_total
        .with_label_values(&[payload.reason.label()])
        .inc();
    info!(request_id = %id, reason = payload.reason.label(), "request cancelled");

    Ok(Json(request))
}

async fn rate_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingBody>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = {
        let mut request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
        lifecycle::rate(&mut request, payload.rating)?;
        request.clone()
    };

    state.publish_request(&request);
    Ok(Json(request))
}

/// Lets the driver app detect "should be tracking but isn't" drift and
/// offer manual recovery.
async fn tracking_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, AppError> {
    state
        .tracker
        .status(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no tracking session for request {id}")))
}
