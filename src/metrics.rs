use prometheus::{
    histogram_opts, opts, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, Registry,
};

use crate::Error;

#[derive(Clone)]
pub struct Metrics {
    pub parity_requests: IntCounter,
    pub failures: IntCounterVec,
    pub quota_lookups: IntCounter,
    pub handler_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let handler_duration = HistogramVec::new(
            histogram_opts!(
                "console_handler_duration_seconds",
                "The duration of request handlers in seconds"
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1., 5.]),
            &["handler"],
        )
        .unwrap();
        let failures = IntCounterVec::new(
            opts!("console_failures_total", "handler failures"),
            &["handler", "error"],
        )
        .unwrap();
        let parity_requests =
            IntCounter::new("console_parity_requests_total", "parity enumerations").unwrap();
        let quota_lookups =
            IntCounter::new("console_quota_lookups_total", "namespace quota lookups").unwrap();

        Metrics {
            parity_requests,
            failures,
            quota_lookups,
            handler_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.handler_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.parity_requests.clone()))?;
        registry.register(Box::new(self.quota_lookups.clone()))?;

        Ok(self)
    }

    pub fn failure(&self, handler: &str, e: &Error) {
        self.failures
            .with_label_values(&[handler, e.metric_label().as_ref()])
            .inc()
    }

    /// Time a handler until the returned guard drops
    pub fn measure(&self, handler: &str) -> HistogramTimer {
        self.handler_duration
            .with_label_values(&[handler])
            .start_timer()
    }
}
