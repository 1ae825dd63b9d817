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

//! `usbdrop` application wiring.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (configuration, logging,
//! command dispatch), `output.rs` (table and JSON renderers).

/// Configuration loading and command dispatch.
pub mod bootstrap;
mod cli;
/// Application error types.
pub mod error;
mod output;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
