use std::time::Instant;

use dashmap::DashMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, TextEncoder,
};

use crate::core::{
    error::ErrorContext, scope, BridgeResult, ContextId, LifecycleEvent, LifecycleListener,
};

const DEFAULT_BUCKETS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
    60000.0,
];

// Total number of received requests
static REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gatebridge_requests_total",
        "The total number of requests received since gatebridge started"
    )
    .unwrap()
});

// Counter for response status codes
static RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatebridge_responses_total",
        "Responses produced by gatebridge per status code and method",
        &[
            "code",   // Response status code
            "method", // Request method
        ]
    )
    .unwrap()
});

// Histogram for handle latency
static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "gatebridge_request_latency_ms",
        "Time between Received and Terminated in milliseconds",
    )
    .buckets(DEFAULT_BUCKETS.to_vec());
    register_histogram!(opts).unwrap()
});

pub const LISTENER_NAME: &str = "prometheus";

/// Records request counts, response codes and latency.
///
/// Start times are keyed by the active context, not the request id, which
/// comes from the caller and may repeat.
#[derive(Default)]
pub struct PrometheusListener {
    started: DashMap<ContextId, Instant>,
}

impl PrometheusListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifecycleListener for PrometheusListener {
    fn name(&self) -> &str {
        LISTENER_NAME
    }

    fn handle(&self, event: &LifecycleEvent<'_>) {
        match event {
            LifecycleEvent::Received { request } => {
                REQUESTS.inc();
                match scope::current() {
                    Some(context) => {
                        self.started.insert(context, Instant::now());
                    }
                    None => debug!("Request {} received outside a context", request.id()),
                }
            }
            LifecycleEvent::Terminated { request, response } => {
                RESPONSES
                    .with_label_values(&[
                        response.status_code.to_string().as_str(),
                        request.method().as_str(),
                    ])
                    .inc();

                match scope::current().and_then(|context| self.started.remove(&context)) {
                    Some((_, start)) => LATENCY.observe(start.elapsed().as_millis() as f64),
                    None => warn!("No start time recorded for request {}", request.id()),
                }
            }
        }
    }
}

/// Render every metric of the default registry in the text exposition format.
pub fn gather_text() -> BridgeResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .with_context("Failed to encode metrics")?;
    String::from_utf8(buffer).with_context("Metrics are not UTF-8")
}
