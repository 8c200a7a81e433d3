use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::location::PositionSample;
use crate::observability::metrics::Metrics;

const UPDATE_CHANNEL_SIZE: usize = 256;
const MIN_PUBLISH_INTERVAL_SECS: i64 = 5;
const MIN_MOVEMENT_METERS: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct LocationUpdate {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub sample: PositionSample,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last: Option<PositionSample>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishOutcome {
    Recorded,
    Throttled,
}

#[derive(Debug)]
struct TrackingSession {
    driver_id: Uuid,
    started_at: DateTime<Utc>,
    last: Option<PositionSample>,
}

/// A sample is worth recording after 5 seconds or 10 meters of movement,
/// whichever comes first.
fn should_record(prev: &PositionSample, next: &PositionSample) -> bool {
    if next.recorded_at - prev.recorded_at >= Duration::seconds(MIN_PUBLISH_INTERVAL_SECS) {
        return true;
    }
    haversine_m(&prev.point, &next.point) >= MIN_MOVEMENT_METERS
}

/// Live-position sessions, one per active ride, owned exclusively by the
/// assigned driver. Positions fan out to subscribers (the customer's map)
/// and vanish when the session stops or the publisher disconnects.
pub struct LocationTracker {
    sessions: DashMap<Uuid, TrackingSession>,
    updates_tx: broadcast::Sender<LocationUpdate>,
    metrics: Metrics,
}

impl LocationTracker {
    pub fn new(metrics: Metrics) -> Self {
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        Self {
            sessions: DashMap::new(),
            updates_tx,
            metrics,
        }
    }

    /// Returns false when a session for this ride is already active.
    pub fn start(&self, ride_id: Uuid, driver_id: Uuid) -> bool {
        if self.sessions.contains_key(&ride_id) {
            return false;
        }
        self.sessions.insert(
            ride_id,
            TrackingSession {
                driver_id,
                started_at: Utc::now(),
                last: None,
            },
        );
        self.metrics.active_tracking_sessions.inc();
        info!(%ride_id, %driver_id, "location tracking started");
        true
    }

    /// Idempotent; removes the session and its published position.
    pub fn stop(&self, ride_id: Uuid) {
        if self.sessions.remove(&ride_id).is_some() {
            self.metrics.active_tracking_sessions.dec();
            info!(%ride_id, "location tracking stopped");
        }
    }

    pub fn is_tracking(&self, ride_id: Uuid) -> bool {
        self.sessions.contains_key(&ride_id)
    }

    pub fn status(&self, ride_id: Uuid) -> Option<SessionStatus> {
        self.sessions.get(&ride_id).map(|session| SessionStatus {
            ride_id,
            driver_id: session.driver_id,
            started_at: session.started_at,
            last: session.last.clone(),
        })
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn publish(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        sample: PositionSample,
    ) -> Result<PublishOutcome, AppError> {
        let mut session = self
            .sessions
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("no tracking session for ride {ride_id}")))?;

        if session.driver_id != driver_id {
            return Err(AppError::Conflict(
                "tracking session belongs to another driver".to_string(),
            ));
        }

        if let Some(prev) = &session.last {
            if !should_record(prev, &sample) {
                return Ok(PublishOutcome::Throttled);
            }
        }

        session.last = Some(sample.clone());
        drop(session);

        let _ = self.updates_tx.send(LocationUpdate {
            ride_id,
            driver_id,
            sample,
        });
        Ok(PublishOutcome::Recorded)
    }

    /// Dead-man's switch: when a driver's connection drops uncleanly, every
    /// session they own is purged so stale positions are never served. The
    /// availability controller restarts tracking on the next online
    /// transition.
    pub fn disconnect_cleanup(&self, driver_id: Uuid) {
        let owned: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .map(|entry| *entry.key())
            .collect();

        for ride_id in owned {
            if self.sessions.remove(&ride_id).is_some() {
                self.metrics.active_tracking_sessions.dec();
                warn!(%ride_id, %driver_id, "tracking session removed on disconnect");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.updates_tx.subscribe()
    }
}
