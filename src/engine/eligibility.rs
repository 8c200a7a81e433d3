use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::driver::DriverView;
use crate::models::request::{DeliveryRequest, Phase};

/// Requests older than this are silently dropped, never surfaced. This is
/// the authoritative expiry; any shorter prompt timer on a device is a UI
/// nicety on top of it.
pub fn offer_max_age() -> Duration {
    Duration::hours(2)
}

/// Pure predicate deciding whether a listening driver should be offered a
/// request. The courier/vehicle conjuncts repeat the subscription's query
/// filter so a mis-scoped event can never leak through.
pub fn should_notify(
    driver: &DriverView,
    request: &DeliveryRequest,
    already_notified: &HashSet<Uuid>,
    now: DateTime<Utc>,
) -> bool {
    if already_notified.contains(&request.id) {
        return false;
    }
    if driver.availability.current_ride_id.is_some() {
        return false;
    }
    if !driver.availability.is_available() {
        return false;
    }
    if request.has_declined(driver.id) {
        return false;
    }
    if !matches!(request.phase, Phase::Searching) {
        return false;
    }
    if now - request.created_at > offer_max_age() {
        return false;
    }
    request.selected_courier == driver.courier_id
        && request.ride.vehicle_type == driver.vehicle_type
}
