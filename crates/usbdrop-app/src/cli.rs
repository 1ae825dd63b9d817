//! Command-line surface of the `usbdrop` binary.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use usbdrop_delivery::DeliveryRequest;
use usbdrop_fsops::{InventoryFilter, SortKey, SortOrder};

#[derive(Debug, Parser)]
#[command(
    name = "usbdrop",
    version,
    about = "Deliver files from a mounted USB volume in transport-sized parts"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the stale artifact reaper until interrupted.
    Serve,
    /// List files on the volume.
    List(ListArgs),
    /// Deliver files into an outbox directory.
    Deliver(DeliverArgs),
    /// Remove stale artifacts once and exit.
    Sweep,
}

impl Command {
    pub(crate) const fn mode(&self) -> &'static str {
        match self {
            Self::Serve => "serve",
            Self::List(_) => "list",
            Self::Deliver(_) => "deliver",
            Self::Sweep => "sweep",
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct ListArgs {
    #[arg(long, value_enum, default_value_t = SortField::Name)]
    pub(crate) sort: SortField,
    #[arg(long, help = "Sort in descending order")]
    pub(crate) desc: bool,
    #[arg(long, conflicts_with_all = ["sunday", "day"], help = "Only files dated today")]
    pub(crate) today: bool,
    #[arg(long, conflicts_with = "day", help = "Only files dated on the most recent Sunday")]
    pub(crate) sunday: bool,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Only files dated on this day")]
    pub(crate) day: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub(crate) format: OutputFormat,
}

impl ListArgs {
    pub(crate) fn filter(&self) -> InventoryFilter {
        if let Some(day) = self.day {
            InventoryFilter::Day(day)
        } else if self.today {
            InventoryFilter::today()
        } else if self.sunday {
            InventoryFilter::last_sunday()
        } else {
            InventoryFilter::All
        }
    }

    pub(crate) const fn order(&self) -> SortOrder {
        if self.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct DeliverArgs {
    #[arg(
        required = true,
        value_name = "PATH",
        help = "Files to deliver, relative to the volume root"
    )]
    pub(crate) paths: Vec<PathBuf>,
    #[arg(long, help = "Label used in status output and as the archive name")]
    pub(crate) label: String,
    #[arg(long, help = "Treat each PATH as a file name found anywhere on the volume")]
    pub(crate) by_name: bool,
    #[arg(long, help = "Package even a single small file")]
    pub(crate) archive: bool,
    #[arg(long, help = "Keep emitted archive parts in the artifact directory")]
    pub(crate) stage: bool,
    #[arg(
        long,
        value_name = "DIR",
        help = "Destination directory; defaults to an outbox under the temp root"
    )]
    pub(crate) outbox: Option<PathBuf>,
    #[arg(long, env = "USBDROP_REQUESTER", help = "User id checked against the allow-list")]
    pub(crate) requester: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub(crate) format: OutputFormat,
}

impl DeliverArgs {
    pub(crate) fn request(&self) -> DeliveryRequest {
        let request = DeliveryRequest::new(self.paths.clone(), self.label.clone())
            .with_archive(self.archive)
            .with_staging(self.stage);
        match &self.requester {
            Some(requester) => request.with_requester(requester.clone()),
            None => request,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum SortField {
    Name,
    Size,
    Created,
}

impl SortField {
    pub(crate) const fn key(self) -> SortKey {
        match self {
            Self::Name => SortKey::Name,
            Self::Size => SortKey::Size,
            Self::Created => SortKey::CreatedAt,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
