#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Delivery jobs for files on the mounted volume.
//!
//! Layout: `gate.rs` (admission control), `sink.rs` (transport seam),
//! `model.rs` (requests and reports), `context.rs` (shared dependencies),
//! `orchestrator.rs` (the job pipeline).

pub mod context;
pub mod error;
pub mod gate;
pub mod model;
pub mod orchestrator;
pub mod sink;

pub use context::DeliveryContext;
pub use error::{DeliveryError, DeliveryResult};
pub use gate::{ConcurrencyGate, GatePermit};
pub use model::{
    ArchiveJob, BatchStatus, DeliveryOutcome, DeliveryReport, DeliveryRequest, DeliveryTarget,
};
pub use orchestrator::DeliveryOrchestrator;
pub use sink::{DeliverySink, DirectorySink, OutboundPart, SinkError};
