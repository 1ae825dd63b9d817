//! Table and JSON renderers for command results.

use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use serde::Serialize;
use usbdrop_delivery::{BatchStatus, DeliveryOutcome, DeliveryReport};
use usbdrop_fsops::{FileRecord, InventorySummary, SweepReport, format_bytes};
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::error::{AppError, AppResult};

/// Files returned by `list` with their aggregate figures.
#[derive(Debug, Serialize)]
pub(crate) struct Listing {
    pub(crate) files: Vec<FileRecord>,
    pub(crate) summary: InventorySummary,
}

#[derive(Debug, Serialize)]
struct ReportView<'a> {
    job_id: Uuid,
    label: &'a str,
    status: &'static str,
    reason: Option<String>,
    outcomes: Vec<OutcomeView>,
    staged: &'a [PathBuf],
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OutcomeView {
    Delivered {
        part_path: PathBuf,
        sequence_index: u32,
    },
    Failed {
        item: String,
        kind: &'static str,
        reason: String,
    },
}

impl<'a> ReportView<'a> {
    fn new(report: &'a DeliveryReport) -> Self {
        let (status, reason) = match &report.status {
            BatchStatus::Complete => ("complete", None),
            BatchStatus::Failed(err) => ("failed", Some(err.to_string())),
        };
        let outcomes = report
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                DeliveryOutcome::Delivered {
                    part_path,
                    sequence_index,
                } => OutcomeView::Delivered {
                    part_path: part_path.clone(),
                    sequence_index: *sequence_index,
                },
                DeliveryOutcome::Failed { item, error } => OutcomeView::Failed {
                    item: item.clone(),
                    kind: error.kind(),
                    reason: error.to_string(),
                },
            })
            .collect();
        Self {
            job_id: report.job_id,
            label: &report.label,
            status,
            reason,
            outcomes,
            staged: &report.staged,
        }
    }
}

pub(crate) fn render_listing(
    listing: &Listing,
    format: OutputFormat,
    out: &mut impl Write,
) -> AppResult<()> {
    match format {
        OutputFormat::Json => write_json(listing, out),
        OutputFormat::Table => {
            writeln!(out, "{:>12}  {:<16}  NAME", "SIZE", "CREATED").map_err(write_error)?;
            for record in &listing.files {
                writeln!(
                    out,
                    "{:>12}  {:<16}  {}",
                    format_bytes(record.size_bytes),
                    record
                        .created_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M"),
                    record.name
                )
                .map_err(write_error)?;
            }
            let summary = &listing.summary;
            writeln!(
                out,
                "{} files, {}",
                summary.file_count,
                format_bytes(summary.total_bytes)
            )
            .map_err(write_error)?;
            if let Some(newest) = &summary.newest {
                writeln!(out, "newest: {}", newest.name).map_err(write_error)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn render_report(
    report: &DeliveryReport,
    format: OutputFormat,
    out: &mut impl Write,
) -> AppResult<()> {
    let view = ReportView::new(report);
    match format {
        OutputFormat::Json => write_json(&view, out),
        OutputFormat::Table => {
            let header = match &view.reason {
                Some(reason) => writeln!(
                    out,
                    "job {} ({}): {} ({reason})",
                    view.job_id, view.label, view.status
                ),
                None => writeln!(out, "job {} ({}): {}", view.job_id, view.label, view.status),
            };
            header.map_err(write_error)?;
            for outcome in &view.outcomes {
                let line = match outcome {
                    OutcomeView::Delivered {
                        part_path,
                        sequence_index,
                    } => writeln!(
                        out,
                        "  delivered  #{sequence_index:<4} {}",
                        part_path.display()
                    ),
                    OutcomeView::Failed { item, kind, reason } => {
                        writeln!(out, "  failed     {item}  {kind}: {reason}")
                    }
                };
                line.map_err(write_error)?;
            }
            for staged in view.staged {
                writeln!(out, "  staged     {}", staged.display()).map_err(write_error)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn render_sweep(report: &SweepReport, out: &mut impl Write) -> AppResult<()> {
    for path in &report.removed {
        writeln!(out, "removed {}", path.display()).map_err(write_error)?;
    }
    for path in &report.failed {
        writeln!(out, "failed  {}", path.display()).map_err(write_error)?;
    }
    writeln!(
        out,
        "sweep finished: {} removed, {} failed, {} retained",
        report.removed.len(),
        report.failed.len(),
        report.retained
    )
    .map_err(write_error)
}

fn write_json(value: &impl Serialize, out: &mut impl Write) -> AppResult<()> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(|source| AppError::Render {
        operation: "output.json",
        source,
    })?;
    writeln!(out).map_err(write_error)
}

fn write_error(source: std::io::Error) -> AppError {
    AppError::io("output.write", source)
}
