use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::sync::OnceLock;
use std::time::Duration;

pub use crate::telemetry::{OutcomeSnapshot, QueryDurationSnapshot, RuntimeCountersSnapshot};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn record_query(&self, success: bool, duration: Duration) {
        self.counters.record_query(success, duration);
    }

    pub fn record_config_fetch(&self, kind: &str, success: bool) {
        self.counters.record_config_fetch(kind, success);
    }

    pub fn record_appender_success(&self, appender: &str) {
        self.counters.record_appender_success(appender);
    }

    pub fn record_appender_failure(&self, appender: &str, reason: &str) {
        self.counters.record_appender_failure(appender, reason);
    }
}

/// Returns the shared `MetricsCollector` instance.
pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}
