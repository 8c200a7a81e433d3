use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::eligibility::should_notify;
use crate::models::driver::{Availability, DriverView};
use crate::models::request::DeliveryRequest;
use crate::observability::metrics::Metrics;

const OFFER_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct RequestOffer {
    pub request: DeliveryRequest,
    pub offered_at: DateTime<Utc>,
}

/// Per-driver listener over the request event stream. Runs the eligibility
/// filter on every change and raises at most one offer per request for the
/// lifetime of the listening session.
pub struct RequestManager {
    driver: RwLock<DriverView>,
    notified: Mutex<HashSet<Uuid>>,
    offers_tx: broadcast::Sender<RequestOffer>,
    metrics: Metrics,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl RequestManager {
    pub fn new(driver: DriverView, metrics: Metrics) -> Arc<Self> {
        let (offers_tx, _) = broadcast::channel(OFFER_CHANNEL_SIZE);
        Arc::new(Self {
            driver: RwLock::new(driver),
            notified: Mutex::new(HashSet::new()),
            offers_tx,
            metrics,
            listener: Mutex::new(None),
        })
    }

    /// Idempotent: a second start while the listener task is alive logs and
    /// returns.
    pub fn start(self: &Arc<Self>, events: broadcast::Receiver<DeliveryRequest>) {
        let mut listener = self.listener.lock().expect("listener lock");
        if listener.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!(driver_id = %self.driver_id(), "request manager already started");
            return;
        }

        let manager = Arc::clone(self);
        *listener = Some(tokio::spawn(manager.run(events)));
        info!(driver_id = %self.driver_id(), "request manager started");
    }

    /// Tears the listener down and forgets the notified-set; the next start
    /// is a fresh session.
    pub fn stop(&self) {
        let mut listener = self.listener.lock().expect("listener lock");
        if let Some(task) = listener.take() {
            task.abort();
        }
        self.notified.lock().expect("notified lock").clear();
        info!(driver_id = %self.driver_id(), "request manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .expect("listener lock")
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Merges fresh availability so the next evaluation sees the current
    /// `current_ride_id` without re-subscribing.
    pub fn update_availability(&self, availability: Availability) {
        self.driver.write().expect("driver lock").availability = availability;
    }

    /// Force-adds to the notified-set so a request the driver just resolved
    /// cannot resurface while the store round-trip is in flight.
    pub fn mark_accepted(&self, request_id: Uuid) {
        self.notified
            .lock()
            .expect("notified lock")
            .insert(request_id);
    }

    pub fn mark_declined(&self, request_id: Uuid) {
        self.notified
            .lock()
            .expect("notified lock")
            .insert(request_id);
    }

    pub fn subscribe_offers(&self) -> broadcast::Receiver<RequestOffer> {
        self.offers_tx.subscribe()
    }

    fn driver_id(&self) -> Uuid {
        self.driver.read().expect("driver lock").id
    }

    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<DeliveryRequest>) {
        loop {
            match events.recv().await {
                Ok(request) => self.evaluate(request),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        driver_id = %self.driver_id(),
                        skipped,
                        "request events lagged; continuing"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(driver_id = %self.driver_id(), "request event stream closed");
                    break;
                }
            }
        }
    }

    fn evaluate(&self, request: DeliveryRequest) {
        let now = Utc::now();
        let eligible = {
            let driver = self.driver.read().expect("driver lock");
            let mut notified = self.notified.lock().expect("notified lock");
            if should_notify(&driver, &request, &notified, now) {
                notified.insert(request.id);
                true
            } else {
                false
            }
        };

        if eligible {
            self.metrics.offers_sent_total.inc();
            debug!(
                driver_id = %self.driver_id(),
                request_id = %request.id,
                "new request offered"
            );
            let _ = self.offers_tx.send(RequestOffer {
                request,
                offered_at: now,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::broadcast;
    use tokio::time::timeout;
    use uuid::Uuid;

    use super::RequestManager;
    use crate::engine::pricing::quote;
    use crate::models::driver::{Availability, DriverView, VehicleType};
    use crate::models::request::{
        DeliveryRequest, PackageDetails, PaymentMethod, Phase, RideDetails,
    };
    use crate::observability::metrics::Metrics;

    fn view() -> DriverView {
        DriverView {
            id: Uuid::from_u128(7),
            courier_id: Uuid::from_u128(1),
            vehicle_type: VehicleType::Bike,
            availability: Availability {
                is_online: true,
                current_ride_id: None,
            },
        }
    }

    fn searching_request() -> DeliveryRequest {
        DeliveryRequest {
            id: Uuid::new_v4(),
            package: PackageDetails {
                pickup_address: "12 Galle Rd".to_string(),
                dropoff_address: "4 Temple Ln".to_string(),
                package_name: "Parcel".to_string(),
                weight_kg: 1.0,
                dimensions: "20x20x20".to_string(),
                shipment_type: "standard".to_string(),
                sender_phone: "+94770000009".to_string(),
            },
            selected_courier: Uuid::from_u128(1),
            ride: RideDetails {
                vehicle_type: VehicleType::Bike,
                distance_km: 3.0,
                quoted: quote(None, VehicleType::Bike, 3.0),
                payment_method: PaymentMethod::Cash,
            },
            phase: Phase::Searching,
            declined_drivers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn redundant_snapshots_raise_a_single_offer() {
        let (events_tx, _) = broadcast::channel(16);
        let manager = RequestManager::new(view(), Metrics::new());
        manager.start(events_tx.subscribe());
        let mut offers = manager.subscribe_offers();

        let request = searching_request();
        events_tx.send(request.clone()).unwrap();
        events_tx.send(request.clone()).unwrap();

        let offer = timeout(Duration::from_millis(500), offers.recv())
            .await
            .expect("first offer")
            .unwrap();
        assert_eq!(offer.request.id, request.id);

        let second = timeout(Duration::from_millis(200), offers.recv()).await;
        assert!(second.is_err(), "duplicate offer for the same request");
    }

    #[tokio::test]
    async fn declined_request_never_resurfaces() {
        let (events_tx, _) = broadcast::channel(16);
        let manager = RequestManager::new(view(), Metrics::new());
        manager.start(events_tx.subscribe());
        let mut offers = manager.subscribe_offers();

        let request = searching_request();
        manager.mark_declined(request.id);
        events_tx.send(request).unwrap();

        let offer = timeout(Duration::from_millis(200), offers.recv()).await;
        assert!(offer.is_err());
    }

    #[tokio::test]
    async fn busy_driver_gets_no_offers_until_released() {
        let (events_tx, _) = broadcast::channel(16);
        let manager = RequestManager::new(view(), Metrics::new());
        manager.start(events_tx.subscribe());
        let mut offers = manager.subscribe_offers();

        manager.update_availability(Availability {
            is_online: true,
            current_ride_id: Some(Uuid::new_v4()),
        });
        events_tx.send(searching_request()).unwrap();
        assert!(timeout(Duration::from_millis(200), offers.recv())
            .await
            .is_err());

        manager.update_availability(Availability {
            is_online: true,
            current_ride_id: None,
        });
        events_tx.send(searching_request()).unwrap();
        let offer = timeout(Duration::from_millis(500), offers.recv()).await;
        assert!(offer.is_ok());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_resets_the_session() {
        let (events_tx, _) = broadcast::channel(16);
        let manager = RequestManager::new(view(), Metrics::new());
        manager.start(events_tx.subscribe());
        manager.start(events_tx.subscribe());
        assert!(manager.is_running());

        let request = searching_request();
        let mut offers = manager.subscribe_offers();
        events_tx.send(request.clone()).unwrap();
        timeout(Duration::from_millis(500), offers.recv())
            .await
            .expect("offer before stop")
            .unwrap();

        manager.stop();
        assert!(!manager.is_running());

        // a new session forgets the notified-set
        manager.start(events_tx.subscribe());
        let mut offers = manager.subscribe_offers();
        events_tx.send(request.clone()).unwrap();
        let offer = timeout(Duration::from_millis(500), offers.recv())
            .await
            .expect("offer after restart")
            .unwrap();
        assert_eq!(offer.request.id, request.id);
    }
}
