//! Prometheus metrics for the module hub.
//!
//! All metrics follow the naming convention: `hub_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // MESSAGE BUS
    // =========================================================================

    /// Messages accepted by the transport
    pub static ref MESSAGES_PUBLISHED: Counter = Counter::new(
        "hub_bus_messages_published_total",
        "Total messages accepted by the transport"
    ).expect("metric creation failed");

    /// Typed deliveries to subscriber callbacks
    pub static ref MESSAGES_DELIVERED: Counter = Counter::new(
        "hub_bus_messages_delivered_total",
        "Total envelopes handed to subscriber callbacks after decoding"
    ).expect("metric creation failed");

    /// Payloads rejected by a subscriber's decoder
    pub static ref DECODE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("hub_bus_decode_failures_total", "Payloads rejected by a subscriber decoder"),
        &["topic"]
    ).expect("metric creation failed");

    /// Subscriber callbacks that panicked
    pub static ref SUBSCRIBER_PANICS: Counter = Counter::new(
        "hub_bus_subscriber_panics_total",
        "Subscriber callbacks that panicked during delivery"
    ).expect("metric creation failed");

    /// Live registrations across all topics
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge = Gauge::new(
        "hub_bus_active_subscriptions",
        "Registrations currently held by message hubs"
    ).expect("metric creation failed");

    /// Time to fan one envelope out to its subscribers
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hub_bus_dispatch_duration_seconds",
            "Time spent delivering one envelope to every subscriber"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("bucket layout"))
    ).expect("metric creation failed");

    // =========================================================================
    // HOST
    // =========================================================================

    /// Modules currently mounted
    pub static ref MOUNTED_MODULES: Gauge = Gauge::new(
        "hub_host_mounted_modules",
        "Modules currently mounted by the host"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Repeated calls are no-ops.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bus
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(MESSAGES_DELIVERED.clone()),
        Box::new(DECODE_FAILURES.clone()),
        Box::new(SUBSCRIBER_PANICS.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
        Box::new(DISPATCH_DURATION.clone()),
        // Host
        Box::new(MOUNTED_MODULES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
