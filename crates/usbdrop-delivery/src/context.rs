//! Shared dependencies handed to every delivery job.

use std::path::PathBuf;
use std::time::Duration;

use usbdrop_config::DeliveryConfig;
use usbdrop_events::EventBus;
use usbdrop_telemetry::Metrics;

use crate::gate::ConcurrencyGate;

/// Explicitly constructed process state threaded through the orchestrator.
#[derive(Clone)]
pub struct DeliveryContext {
    /// Mounted volume every request resolves against.
    pub root: PathBuf,
    /// Parent of the job-scoped working directories.
    pub temp_root: PathBuf,
    /// Long-lived directory for staged artifacts.
    pub artifact_dir: PathBuf,
    /// Transport ceiling for one part, in bytes.
    pub max_part_bytes: u64,
    /// Optional bound on the duration of one admitted job.
    pub job_timeout: Option<Duration>,
    /// Process-wide admission gate.
    pub gate: ConcurrencyGate,
    /// Progress events for the transport.
    pub events: EventBus,
    /// Shared metrics registry.
    pub metrics: Metrics,
}

impl DeliveryContext {
    /// Build the context from validated configuration.
    #[must_use]
    pub fn from_config(config: &DeliveryConfig, events: EventBus, metrics: Metrics) -> Self {
        let gate = ConcurrencyGate::new(config.gate_capacity).with_metrics(metrics.clone());
        Self {
            root: config.root.clone(),
            temp_root: config.temp_root.clone(),
            artifact_dir: config.artifact_dir.clone(),
            max_part_bytes: config.max_part_bytes,
            job_timeout: config.job_timeout,
            gate,
            events,
            metrics,
        }
    }
}
