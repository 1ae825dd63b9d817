//! Process-wide admission control for delivery jobs.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use usbdrop_telemetry::Metrics;

use crate::error::{DeliveryError, DeliveryResult};

/// Counting gate bounding how many jobs run at once.
///
/// Waiters are admitted first-come-first-served.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    metrics: Option<Metrics>,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` jobs; zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            metrics: None,
        }
    }

    /// Report admissions and waiters through `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wait for a free slot; the slot is held until the permit is released or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::GateClosed`] if the semaphore behind the gate was closed.
    pub async fn acquire(&self) -> DeliveryResult<GatePermit> {
        if let Some(metrics) = &self.metrics {
            metrics.add_gate_waiting(1);
        }
        let acquired = Arc::clone(&self.semaphore).acquire_owned().await;
        if let Some(metrics) = &self.metrics {
            metrics.add_gate_waiting(-1);
        }
        let permit = acquired.map_err(|_| DeliveryError::GateClosed)?;
        if let Some(metrics) = &self.metrics {
            metrics.add_active_jobs(1);
        }
        Ok(GatePermit {
            _permit: permit,
            metrics: self.metrics.clone(),
        })
    }

    /// Fixed number of slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// One held slot of a [`ConcurrencyGate`].
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    metrics: Option<Metrics>,
}

impl GatePermit {
    /// Return the slot to the gate.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.add_active_jobs(-1);
        }
    }
}
