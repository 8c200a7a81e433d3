use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::request::{
    ActiveDelivery, AssignedDriver, Cancellation, CancellationReason, CancelledBy, Completion,
    DeclinedDriver, DeliveryRequest, DeliveryStage, Phase,
};

/// Exactly 4 numeric digits, zero-padded.
pub fn generate_pin<R: Rng>(rng: &mut R) -> String {
    format!("{:04}", rng.gen_range(0..10_000))
}

/// Accept guard: only a still-searching request can be taken, and only by a
/// driver from the request's courier pool and vehicle class (re-checked
/// here in case the caller bypassed the matching subscription). The caller
/// must hold the request's entry lock so the check and the write are one
/// step; a concurrent acceptance makes the loser fail here.
pub fn accept(
    request: &mut DeliveryRequest,
    driver: &Driver,
    pin: String,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if request.selected_courier != driver.courier_id
        || request.ride.vehicle_type != driver.vehicle_type
    {
        return Err(AppError::Conflict(
            "driver does not match the request's courier or vehicle class".to_string(),
        ));
    }
    match request.phase {
        Phase::Searching => {
            request.phase = Phase::Active(ActiveDelivery {
                driver: AssignedDriver {
                    driver_id: driver.id,
                    driver_name: driver.name.clone(),
                    driver_phone: driver.phone.clone(),
                    vehicle_number: driver.vehicle_number.clone(),
                },
                stage: DeliveryStage::Accepted,
                delivery_pin: pin,
                pin_attempts: 0,
                accepted_at: now,
                collection_started_at: None,
                package_collected_at: None,
                last_known_position: None,
            });
            Ok(())
        }
        _ => Err(AppError::RequestUnavailable),
    }
}

/// Records a decline while the request is still searching. Append-only and
/// idempotent per driver.
pub fn decline(
    request: &mut DeliveryRequest,
    driver: &Driver,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !matches!(request.phase, Phase::Searching) {
        return Err(AppError::RequestUnavailable);
    }
    if !request.has_declined(driver.id) {
        request.declined_drivers.push(DeclinedDriver {
            driver_id: driver.id,
            driver_name: driver.name.clone(),
            declined_at: now,
        });
    }
    Ok(())
}

pub fn start_collection(
    request: &mut DeliveryRequest,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let active = active_for_driver(request, driver_id)?;
    match active.stage {
        DeliveryStage::Accepted => {
            active.stage = DeliveryStage::Collecting;
            active.collection_started_at = Some(now);
            Ok(())
        }
        _ => Err(AppError::Conflict("collection already started".to_string())),
    }
}

/// Compares against the stored PIN read fresh under the entry lock. On
/// mismatch nothing advances; the attempt counter only matters when a
/// lockout limit is configured.
pub fn verify_pin(
    request: &mut DeliveryRequest,
    driver_id: Uuid,
    entered: &str,
    attempt_limit: Option<u32>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let active = active_for_driver(request, driver_id)?;
    if active.stage != DeliveryStage::Collecting {
        return Err(AppError::Conflict(
            "package collection is not in progress".to_string(),
        ));
    }
    if let Some(limit) = attempt_limit {
        if active.pin_attempts >= limit {
            return Err(AppError::Conflict("PIN attempts exhausted".to_string()));
        }
    }
    if entered != active.delivery_pin {
        active.pin_attempts += 1;
        return Err(AppError::BadRequest("incorrect PIN".to_string()));
    }

    active.stage = DeliveryStage::InTransit;
    active.package_collected_at = Some(now);
    Ok(())
}

/// Delivery requires a proof artifact; without one the request stays in
/// transit.
pub fn complete(
    request: &mut DeliveryRequest,
    driver_id: Uuid,
    proof_photo_url: &str,
    now: DateTime<Utc>,
) -> Result<AssignedDriver, AppError> {
    if proof_photo_url.trim().is_empty() {
        return Err(AppError::BadRequest(
            "proof of delivery photo is required".to_string(),
        ));
    }

    let (driver, accepted_at, collected_at) = {
        let active = active_for_driver(request, driver_id)?;
        if active.stage != DeliveryStage::InTransit {
            return Err(AppError::Conflict(
                "package is not in transit yet".to_string(),
            ));
        }
        let collected_at = active.package_collected_at.ok_or_else(|| {
            AppError::Internal("in-transit request missing collection time".to_string())
        })?;
        (active.driver.clone(), active.accepted_at, collected_at)
    };

    request.phase = Phase::Completed(Completion {
        driver: driver.clone(),
        proof_photo_url: proof_photo_url.to_string(),
        accepted_at,
        package_collected_at: collected_at,
        completed_at: now,
        customer_rating: None,
    });
    Ok(driver)
}

/// Cancels any non-terminal request. Returns the driver that must be
/// released, if one was assigned.
pub fn cancel(
    request: &mut DeliveryRequest,
    cancelled_by: CancelledBy,
    reason: CancellationReason,
    now: DateTime<Utc>,
) -> Result<Option<AssignedDriver>, AppError> {
    let driver = match &request.phase {
        Phase::Searching => None,
        Phase::Active(active) => Some(active.driver.clone()),
        Phase::Cancelled(_) | Phase::Completed(_) => {
            return Err(AppError::Conflict(
                "request is already closed".to_string(),
            ));
        }
    };

    request.phase = Phase::Cancelled(Cancellation {
        driver: driver.clone(),
        cancelled_by,
        reason,
        cancelled_at: now,
    });
    Ok(driver)
}

/// Rating is legal exactly once, only after delivery.
pub fn rate(request: &mut DeliveryRequest, stars: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&stars) {
        return Err(AppError::BadRequest("rating must be 1-5 stars".to_string()));
    }
    match &mut request.phase {
        Phase::Completed(completion) => {
            if completion.customer_rating.is_some() {
                return Err(AppError::Conflict("delivery already rated".to_string()));
            }
            completion.customer_rating = Some(stars);
            Ok(())
        }
        _ => Err(AppError::Conflict(
            "only delivered requests can be rated".to_string(),
        )),
    }
}

fn active_for_driver(
    request: &mut DeliveryRequest,
    driver_id: Uuid,
) -> Result<&mut ActiveDelivery, AppError> {
    match &mut request.phase {
        Phase::Active(active) if active.driver.driver_id == driver_id => Ok(active),
        Phase::Active(_) => Err(AppError::Conflict(
            "request is held by another driver".to_string(),
        )),
        _ => Err(AppError::RequestUnavailable),
    }
}
