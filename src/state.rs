use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::manager::RequestManager;
use crate::engine::tracking::LocationTracker;
use crate::models::courier::Courier;
use crate::models::driver::Driver;
use crate::models::request::DeliveryRequest;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub couriers: DashMap<Uuid, Courier>,
    pub drivers: DashMap<Uuid, Driver>,
    pub requests: DashMap<Uuid, DeliveryRequest>,
    /// One live request manager per online driver.
    pub managers: DashMap<Uuid, Arc<RequestManager>>,
    pub tracker: LocationTracker,
    /// Change-subscription channel: every request create/update publishes
    /// the fresh document here.
    pub request_events_tx: broadcast::Sender<DeliveryRequest>,
    pub metrics: Metrics,
    pub max_pin_attempts: Option<u32>,
}

impl AppState {
    pub fn new(event_buffer_size: usize, max_pin_attempts: Option<u32>) -> Self {
        let (request_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();

        Self {
            couriers: DashMap::new(),
            drivers: DashMap::new(),
            requests: DashMap::new(),
            managers: DashMap::new(),
            tracker: LocationTracker::new(metrics.clone()),
            request_events_tx,
            metrics,
            max_pin_attempts,
        }
    }

    /// Fan a fresh request document out to every listening manager. Send
    /// errors only mean nobody is listening.
    pub fn publish_request(&self, request: &DeliveryRequest) {
        let _ = self.request_events_tx.send(request.clone());
    }
}
