use prometheus::{
    Encoder, Histogram, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub booking_transitions_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub route_fetches_total: IntCounterVec,
    pub active_tracking_sessions: IntGauge,
    pub slot_query_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let booking_transitions_total = IntCounterVec::new(
            Opts::new(
                "booking_transitions_total",
                "Booking status transitions by target status and outcome",
            ),
            &["status", "outcome"],
        )
        .expect("valid booking_transitions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Outbound notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let route_fetches_total = IntCounterVec::new(
            Opts::new(
                "route_fetches_total",
                "Directions lookups by outcome (validated or fallback)",
            ),
            &["outcome"],
        )
        .expect("valid route_fetches_total metric");

        let active_tracking_sessions = IntGauge::new(
            "active_tracking_sessions",
            "Currently active location tracking sessions",
        )
        .expect("valid active_tracking_sessions metric");

        let slot_query_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "slot_query_seconds",
            "Latency of availability slot queries in seconds",
        ))
        .expect("valid slot_query_seconds metric");

        registry
            .register(Box::new(booking_transitions_total.clone()))
            .expect("register booking_transitions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(route_fetches_total.clone()))
            .expect("register route_fetches_total");
        registry
            .register(Box::new(active_tracking_sessions.clone()))
            .expect("register active_tracking_sessions");
        registry
            .register(Box::new(slot_query_seconds.clone()))
            .expect("register slot_query_seconds");

        Self {
            registry,
            booking_transitions_total,
            notifications_total,
            route_fetches_total,
            active_tracking_sessions,
            slot_query_seconds,
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
