//! Process-wide `app` span.

use tracing::span::Entered;
use tracing::{Span, info_span};

use crate::init::build_sha;

/// Keeps an `app` span tagged with the running command entered until dropped.
///
/// The span is leaked and stays entered on the calling thread.
pub struct GlobalContextGuard {
    _entered: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the span for `mode`, typically the CLI subcommand name.
    #[must_use]
    pub fn new(mode: &'static str) -> Self {
        let span: &'static Span = Box::leak(Box::new(info_span!(
            "app",
            mode,
            build_sha = %build_sha()
        )));
        Self {
            _entered: span.enter(),
        }
    }
}
