//! Filesystem side of the USB delivery pipeline: containment checks, inventory
//! listing, archive packaging, part splitting, and stale artifact reaping.
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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

pub mod archive;
pub mod error;
pub mod filter;
pub mod inventory;
pub mod path_guard;
pub mod reaper;
pub mod split;

pub use archive::{archive_file_name, build_archive};
pub use error::{FsOpsError, FsOpsResult};
pub use filter::{InventoryFilter, effective_date, filename_timestamp, most_recent_sunday};
pub use inventory::{
    FileRecord, InventorySummary, SortKey, SortOrder, find_by_name, format_bytes, list,
    sort_records, summarize,
};
pub use path_guard::{is_accessible, is_safe};
pub use reaper::{ARTIFACT_PATTERNS, StaleArtifactReaper, SweepReport, sweep};
pub use split::{Part, part_path, split};
