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

//! Environment-driven configuration for the USB delivery pipeline.
//!
//! Layout: `model.rs` (typed config models), `loader.rs` (environment
//! loading), `validate.rs` (parsing helpers), `defaults.rs` (reference values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{AllowList, DeliveryConfig, LogFormatKind};
