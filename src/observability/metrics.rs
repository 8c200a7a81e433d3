use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_created_total: IntCounter,
    pub accept_attempts_total: IntCounterVec,
    pub cancellations_total: IntCounterVec,
    pub deliveries_completed_total: IntCounter,
    pub offers_sent_total: IntCounter,
    pub pin_failures_total: IntCounter,
    pub active_tracking_sessions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_created_total = IntCounter::new(
            "requests_created_total",
            "Total delivery requests created",
        )
        .expect("valid requests_created_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let cancellations_total = IntCounterVec::new(
            Opts::new("cancellations_total", "Cancellations by reason"),
            &["reason"],
        )
        .expect("valid cancellations_total metric");

        let deliveries_completed_total = IntCounter::new(
            "deliveries_completed_total",
            "Total deliveries completed with proof",
        )
        .expect("valid deliveries_completed_total metric");

        let offers_sent_total = IntCounter::new(
            "offers_sent_total",
            "Request offers raised to drivers",
        )
        .expect("valid offers_sent_total metric");

        let pin_failures_total = IntCounter::new(
            "pin_failures_total",
            "Collection PIN verification failures",
        )
        .expect("valid pin_failures_total metric");

        let active_tracking_sessions = IntGauge::new(
            "active_tracking_sessions",
            "Currently live location tracking sessions",
        )
        .expect("valid active_tracking_sessions metric");

        registry
            .register(Box::new(requests_created_total.clone()))
            .expect("register requests_created_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(cancellations_total.clone()))
            .expect("register cancellations_total");
        registry
            .register(Box::new(deliveries_completed_total.clone()))
            .expect("register deliveries_completed_total");
        registry
            .register(Box::new(offers_sent_total.clone()))
            .expect("register offers_sent_total");
        registry
            .register(Box::new(pin_failures_total.clone()))
            .expect("register pin_failures_total");
        registry
            .register(Box::new(active_tracking_sessions.clone()))
            .expect("register active_tracking_sessions");

        Self {
            registry,
            requests_created_total,
            accept_attempts_total,
            cancellations_total,
            deliveries_completed_total,
            offers_sent_total,
            pin_failures_total,
            active_tracking_sessions,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
