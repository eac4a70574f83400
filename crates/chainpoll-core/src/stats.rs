//! Job statistics.
//!
//! A [`StatsSink`] receives counters and gauges from every running job. It is
//! write-only from the engine's point of view and is the one piece of state
//! shared between jobs, so implementations must be thread-safe.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Label set attached to a measurement, e.g. `[("job", "evm"), ("status", "ok")]`.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

pub const JOB_EXECUTION: &str = "job_execution";
pub const JOB_ITEMS: &str = "job_items";
pub const JOB_CURSOR_POSITION: &str = "job_cursor_position";
pub const JOB_STOPPED: &str = "job_stopped";

/// Sink for job counters and gauges.
pub trait StatsSink: Send + Sync {
    /// Add `value` to the counter `name` under `labels`.
    fn count(&self, name: &str, labels: Labels<'_>, value: u64);

    /// Set the gauge `name` under `labels`.
    fn gauge(&self, name: &str, labels: Labels<'_>, value: f64);
}

/// Emits each measurement as a `tracing` debug event (target `chainpoll::stats`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn count(&self, name: &str, labels: Labels<'_>, value: u64) {
        tracing::debug!(
            target: "chainpoll::stats",
            metric = name,
            labels = %render(labels),
            value,
            "count"
        );
    }

    fn gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        tracing::debug!(
            target: "chainpoll::stats",
            metric = name,
            labels = %render(labels),
            value,
            "gauge"
        );
    }
}

/// Canonical `name{k=v,...}` key for a measurement; labels are sorted.
pub fn series_key(name: &str, labels: Labels<'_>) -> String {
    format!("{name}{{{}}}", render(labels))
}

fn render(labels: Labels<'_>) -> String {
    let mut sorted: Vec<_> = labels.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
struct Series {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
}

/// In-memory sink for tests and ad-hoc inspection.
#[derive(Default)]
pub struct MemoryStatsSink {
    series: Mutex<Series>,
}

impl MemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value (0 if never incremented).
    pub fn counter(&self, name: &str, labels: Labels<'_>) -> u64 {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.counters.get(&series_key(name, labels)).copied().unwrap_or(0)
    }

    /// Last gauge value, if ever set.
    pub fn gauge_value(&self, name: &str, labels: Labels<'_>) -> Option<f64> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.gauges.get(&series_key(name, labels)).copied()
    }

    /// All counters as `(series key, value)`, sorted by key.
    pub fn counters(&self) -> Vec<(String, u64)> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.counters.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

impl StatsSink for MemoryStatsSink {
    fn count(&self, name: &str, labels: Labels<'_>, value: u64) {
        let mut series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        *series.counters.entry(series_key(name, labels)).or_default() += value;
    }

    fn gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        let mut series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.gauges.insert(series_key(name, labels), value);
    }
}
