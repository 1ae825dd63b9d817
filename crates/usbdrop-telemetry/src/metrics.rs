//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges relevant to delivery jobs and the reaper.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    jobs_total: IntCounterVec,
    parts_total: IntCounterVec,
    items_rejected_total: IntCounterVec,
    reaped_total: IntCounter,
    reaper_errors_total: IntCounter,
    active_jobs: IntGauge,
    gate_waiting: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs currently holding a gate slot.
    pub active_jobs: i64,
    /// Jobs currently waiting for a gate slot.
    pub gate_waiting: i64,
    /// Artifacts removed by the reaper since start-up.
    pub reaped_total: u64,
    /// Per-file reaper failures since start-up.
    pub reaper_errors_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_total = counter_vec(
            "delivery_jobs_total",
            "Delivery jobs finished by status",
            &["status"],
        )?;
        let parts_total = counter_vec(
            "delivery_parts_total",
            "Parts handed to the transport sink by status",
            &["status"],
        )?;
        let items_rejected_total = counter_vec(
            "delivery_items_rejected_total",
            "Requested items dropped before packaging by reason",
            &["reason"],
        )?;
        let reaped_total = IntCounter::with_opts(Opts::new(
            "reaper_artifacts_removed_total",
            "Stale archive artifacts removed by the reaper",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reaper_artifacts_removed_total",
            source,
        })?;
        let reaper_errors_total = IntCounter::with_opts(Opts::new(
            "reaper_errors_total",
            "Artifacts the reaper failed to inspect or remove",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reaper_errors_total",
            source,
        })?;
        let active_jobs = gauge("delivery_active_jobs", "Jobs currently holding a gate slot")?;
        let gate_waiting = gauge("delivery_gate_waiting", "Jobs waiting for a gate slot")?;

        register(&registry, "delivery_jobs_total", jobs_total.clone())?;
        register(&registry, "delivery_parts_total", parts_total.clone())?;
        register(
            &registry,
            "delivery_items_rejected_total",
            items_rejected_total.clone(),
        )?;
        register(
            &registry,
            "reaper_artifacts_removed_total",
            reaped_total.clone(),
        )?;
        register(
            &registry,
            "reaper_errors_total",
            reaper_errors_total.clone(),
        )?;
        register(&registry, "delivery_active_jobs", active_jobs.clone())?;
        register(&registry, "delivery_gate_waiting", gate_waiting.clone())?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                jobs_total,
                parts_total,
                items_rejected_total,
                reaped_total,
                reaper_errors_total,
                active_jobs,
                gate_waiting,
            }),
        })
    }

    /// Increment the finished job counter for the given status.
    pub fn inc_job(&self, status: &str) {
        self.inner.jobs_total.with_label_values(&[status]).inc();
    }

    /// Increment the part counter for the given status.
    pub fn inc_part(&self, status: &str) {
        self.inner.parts_total.with_label_values(&[status]).inc();
    }

    /// Increment the rejected item counter for the given reason.
    pub fn inc_item_rejected(&self, reason: &str) {
        self.inner
            .items_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record one artifact removed by the reaper.
    pub fn inc_reaped(&self) {
        self.inner.reaped_total.inc();
    }

    /// Record one reaper failure.
    pub fn inc_reaper_error(&self) {
        self.inner.reaper_errors_total.inc();
    }

    /// Adjust the active job gauge by `delta`.
    pub fn add_active_jobs(&self, delta: i64) {
        self.inner.active_jobs.add(delta);
    }

    /// Adjust the gate waiter gauge by `delta`.
    pub fn add_gate_waiting(&self, delta: i64) {
        self.inner.gate_waiting.add(delta);
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_jobs: self.inner.active_jobs.get(),
            gate_waiting: self.inner.gate_waiting.get(),
            reaped_total: self.inner.reaped_total.get(),
            reaper_errors_total: self.inner.reaper_errors_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<()>
where
    C: prometheus::core::Collector + 'static,
{
    registry
        .register(Box::new(collector))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
