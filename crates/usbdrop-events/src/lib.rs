//! Event bus for delivery progress.
//!
//! Delivery jobs publish their outcomes here so the transport layer can render
//! progress while a batch is still running. Internally it uses
//! `tokio::broadcast` with a bounded replay buffer; when the channel overflows,
//! the oldest events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed delivery events surfaced to the transport layer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job acquired its gate slot and started work.
    JobStarted {
        /// Job identifier.
        job_id: Uuid,
        /// Human-readable label of the request.
        label: String,
        /// Number of requested items.
        items: usize,
    },
    /// One part (or a directly delivered file) reached the sink.
    Delivered {
        /// Job identifier.
        job_id: Uuid,
        /// Path of the delivered part.
        part_path: String,
        /// Zero-based position of the part within the job.
        sequence_index: u32,
    },
    /// One requested item or part could not be delivered.
    Failed {
        /// Job identifier.
        job_id: Uuid,
        /// Identifier of the failed item or part.
        item: String,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The job finished; per-item failures may still have been reported.
    BatchComplete {
        /// Job identifier.
        job_id: Uuid,
        /// Number of parts that reached the sink.
        delivered: usize,
        /// Number of items or parts that failed.
        failed: usize,
    },
    /// The job aborted before all parts could be produced.
    BatchFailed {
        /// Job identifier.
        job_id: Uuid,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The reaper removed a stale artifact.
    ArtifactReaped {
        /// Path of the removed artifact.
        path: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::Delivered { .. } => "delivered",
            Self::Failed { .. } => "failed",
            Self::BatchComplete { .. } => "batch_complete",
            Self::BatchFailed { .. } => "batch_failed",
            Self::ArtifactReaped { .. } => "artifact_reaped",
        }
    }

    /// Job the event belongs to, if any.
    #[must_use]
    pub const fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::Delivered { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::BatchComplete { job_id, .. }
            | Self::BatchFailed { job_id, .. } => Some(*job_id),
            Self::ArtifactReaped { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn delivered(job_id: Uuid, index: u32) -> Event {
        Event::Delivered {
            job_id,
            part_path: format!("batch.zip.part{index}"),
            sequence_index: index,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::with_capacity(16);
        let job_id = Uuid::new_v4();

        let mut last_id = 0;
        for index in 0..5 {
            last_id = bus.publish(delivered(job_id, index));
        }
        assert_eq!(last_id, 5);
        assert_eq!(bus.last_event_id(), Some(5));

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = timeout(Duration::from_secs(1), stream.next()).await? {
                received.push(event);
            }
        }

        let ids: Vec<_> = received.iter().map(|event| event.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest() {
        let bus = EventBus::with_capacity(2);
        for index in 0..4 {
            bus.publish(Event::ArtifactReaped {
                path: format!("old-{index}.zip"),
            });
        }
        let mut stream = bus.subscribe(Some(0));
        let first = stream.next().await.map(|event| event.id);
        assert_eq!(first, Some(3));
    }

    #[test]
    fn events_serialise_with_snake_case_tag() -> Result<(), serde_json::Error> {
        let job_id = Uuid::nil();
        let event = Event::BatchFailed {
            job_id,
            reason: "archive failed".into(),
        };
        let value = serde_json::to_value(&event)?;
        assert_eq!(value["type"], "batch_failed");
        assert_eq!(event.kind(), "batch_failed");
        assert_eq!(event.job_id(), Some(job_id));
        assert_eq!(
            Event::ArtifactReaped {
                path: "x.zip".into()
            }
            .job_id(),
            None
        );
        Ok(())
    }
}
