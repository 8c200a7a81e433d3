use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::manager::RequestManager;
use crate::error::AppError;
use crate::models::driver::{ApprovalStatus, Driver, DriverView};
use crate::models::request::Phase;
use crate::state::AppState;

/// Flips a driver online, heals any stale ride reference, restarts the
/// tracking session for a delivery that survived a crash, and starts the
/// driver's request manager.
pub fn go_online(state: &Arc<AppState>, driver_id: Uuid) -> Result<Driver, AppError> {
    {
        let mut driver = get_driver_mut(state, driver_id)?;
        if driver.approval != ApprovalStatus::Approved {
            return Err(AppError::Conflict(
                "driver is not approved to go online".to_string(),
            ));
        }
        driver.availability.is_online = true;
        driver.updated_at = Utc::now();
    }

    reconcile(state, driver_id);

    let driver = read_driver(state, driver_id)?;
    if let Some(ride_id) = driver.availability.current_ride_id {
        // crash recovery: an active delivery resumes tracking on its own
        if !state.tracker.is_tracking(ride_id) && !state.tracker.start(ride_id, driver_id) {
            warn!(%driver_id, %ride_id, "could not restart tracking for active delivery");
        }
    }

    let manager = state
        .managers
        .entry(driver_id)
        .or_insert_with(|| RequestManager::new(DriverView::from(&driver), state.metrics.clone()))
        .value()
        .clone();
    manager.update_availability(driver.availability.clone());
    manager.start(state.request_events_tx.subscribe());

    info!(%driver_id, "driver online");
    Ok(driver)
}

/// Going offline stops matching and tracking but deliberately keeps
/// `current_ride_id`: an active delivery survives an accidental toggle.
pub fn go_offline(state: &Arc<AppState>, driver_id: Uuid) -> Result<Driver, AppError> {
    let driver = {
        let mut driver = get_driver_mut(state, driver_id)?;
        driver.availability.is_online = false;
        driver.updated_at = Utc::now();
        driver.clone()
    };

    if let Some(manager) = state.managers.get(&driver_id) {
        manager.update_availability(driver.availability.clone());
        manager.stop();
    }
    if let Some(ride_id) = driver.availability.current_ride_id {
        state.tracker.stop(ride_id);
    }

    info!(%driver_id, "driver offline");
    Ok(driver)
}

/// Claims the driver for a ride. `current_ride_id` is the mutual-exclusion
/// token: the write happens under the driver's entry lock, and availability
/// flips in the same write because it is derived from the pair.
pub fn reserve(state: &Arc<AppState>, driver_id: Uuid, ride_id: Uuid) -> Result<Driver, AppError> {
    let driver = {
        let mut driver = get_driver_mut(state, driver_id)?;
        if driver.approval != ApprovalStatus::Approved {
            return Err(AppError::Conflict("driver is not approved".to_string()));
        }
        if driver.availability.current_ride_id.is_some() {
            return Err(AppError::Conflict(
                "driver already holds an active delivery".to_string(),
            ));
        }
        driver.availability.current_ride_id = Some(ride_id);
        driver.updated_at = Utc::now();
        driver.clone()
    };

    sync_manager(state, &driver);
    Ok(driver)
}

/// Clears the ride claim if the driver still holds it. Safe to call twice;
/// a claim for a different ride is left alone.
pub fn release(state: &Arc<AppState>, driver_id: Uuid, ride_id: Uuid) {
    let released = {
        match state.drivers.get_mut(&driver_id) {
            Some(mut driver) => {
                if driver.availability.current_ride_id == Some(ride_id) {
                    driver.availability.current_ride_id = None;
                    driver.updated_at = Utc::now();
                    Some(driver.clone())
                } else {
                    None
                }
            }
            None => None,
        }
    };

    if let Some(driver) = released {
        sync_manager(state, &driver);
        info!(%driver_id, %ride_id, "driver released");
    }
}

/// Self-healing pass: a `current_ride_id` pointing at a request that no
/// longer exists, is terminal, or is assigned to a different driver is
/// cleared and its tracking session stopped. A claim on a request that is
/// still `Searching` is indeterminate — an accept write may be in flight,
/// and the accept path owns the rollback of its own claim — so it is left
/// alone. Returns the ride that was cleared.
pub fn reconcile(state: &Arc<AppState>, driver_id: Uuid) -> Option<Uuid> {
    let ride_id = state
        .drivers
        .get(&driver_id)?
        .availability
        .current_ride_id?;

    let still_held = state
        .requests
        .get(&ride_id)
        .is_some_and(|request| match &request.phase {
            Phase::Searching => true,
            Phase::Active(active) => active.driver.driver_id == driver_id,
            Phase::Cancelled(_) | Phase::Completed(_) => false,
        });

    if still_held {
        return None;
    }

    warn!(%driver_id, %ride_id, "clearing stale ride reference");
    release(state, driver_id, ride_id);
    state.tracker.stop(ride_id);
    Some(ride_id)
}

/// Periodic health check over every driver, complementing the reconcile
/// pass that runs on each online transition.
pub async fn run_reconciler(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "availability reconciler started");
    let mut ticker = interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let driver_ids: Vec<Uuid> = state.drivers.iter().map(|entry| *entry.key()).collect();
        for driver_id in driver_ids {
            reconcile(&state, driver_id);
        }
    }
}

fn sync_manager(state: &Arc<AppState>, driver: &Driver) {
    if let Some(manager) = state.managers.get(&driver.id) {
        manager.update_availability(driver.availability.clone());
    }
}

fn read_driver(state: &Arc<AppState>, driver_id: Uuid) -> Result<Driver, AppError> {
    state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
}

fn get_driver_mut<'a>(
    state: &'a Arc<AppState>,
    driver_id: Uuid,
) -> Result<dashmap::mapref::one::RefMut<'a, Uuid, Driver>, AppError> {
    state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
}
