use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use usbdrop_config::{DeliveryConfig, LogFormatKind};
use usbdrop_delivery::{
    BatchStatus, DeliveryContext, DeliveryOrchestrator, DeliveryReport, DeliveryRequest,
    DirectorySink,
};
use usbdrop_events::EventBus;
use usbdrop_fsops::{StaleArtifactReaper, SweepReport, find_by_name, list, sort_records, summarize};
use usbdrop_telemetry::{
    GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha, init_logging,
};

use crate::cli::{Cli, Command, DeliverArgs, ListArgs};
use crate::error::{AppError, AppResult};
use crate::output::{Listing, render_listing, render_report, render_sweep};

const DEFAULT_OUTBOX_DIR: &str = "outbox";

/// Entry point for the `usbdrop` boot sequence.
///
/// # Errors
///
/// Returns an error if configuration or logging cannot be initialised, or if
/// the selected command fails.
pub async fn run_app() -> AppResult<()> {
    let cli = Cli::parse();
    let config =
        DeliveryConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;

    let logging = LoggingConfig {
        level: &config.log_level,
        format: LogFormat::from_setting(config.log_format.map(LogFormatKind::as_str)),
        ..LoggingConfig::default()
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new(cli.command.mode());

    info!(
        root = %config.root.display(),
        artifact_dir = %config.artifact_dir.display(),
        build_sha = build_sha(),
        "usbdrop starting"
    );

    let events = EventBus::new();
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

    match cli.command {
        Command::Serve => serve(&config, events, metrics).await,
        Command::List(args) => {
            let listing = list_inventory(&config, &args).await?;
            render_listing(&listing, args.format, &mut io::stdout().lock())
        }
        Command::Deliver(args) => {
            let report = deliver(&config, &args, events, metrics).await?;
            render_report(&report, args.format, &mut io::stdout().lock())?;
            match report.status {
                BatchStatus::Complete => Ok(()),
                BatchStatus::Failed(err) => Err(AppError::delivery("delivery.run", err)),
            }
        }
        Command::Sweep => {
            let report = sweep_once(&config, events, metrics).await?;
            render_sweep(&report, &mut io::stdout().lock())
        }
    }
}

fn reaper(config: &DeliveryConfig, events: EventBus, metrics: Metrics) -> StaleArtifactReaper {
    StaleArtifactReaper::new(
        config.artifact_dir.clone(),
        config.retention,
        config.sweep_interval,
        events,
        metrics,
    )
}

async fn serve(config: &DeliveryConfig, events: EventBus, metrics: Metrics) -> AppResult<()> {
    let worker = reaper(config, events, metrics.clone()).spawn();
    info!(
        artifact_dir = %config.artifact_dir.display(),
        retention_secs = config.retention.as_secs(),
        interval_secs = config.sweep_interval.as_secs(),
        "artifact reaper running; waiting for shutdown signal"
    );

    let signal = tokio::signal::ctrl_c().await;
    worker.abort();
    if let Err(err) = worker.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "artifact reaper join failed");
    }
    signal.map_err(|source| AppError::io("signal.ctrl_c", source))?;

    let snapshot = metrics.snapshot();
    info!(
        reaped = snapshot.reaped_total,
        reaper_errors = snapshot.reaper_errors_total,
        "usbdrop stopped"
    );
    Ok(())
}

async fn list_inventory(config: &DeliveryConfig, args: &ListArgs) -> AppResult<Listing> {
    let root = config.root.clone();
    let filter = args.filter();
    let key = args.sort.key();
    let order = args.order();
    tokio::task::spawn_blocking(move || {
        let records = list(&root).map_err(|err| AppError::fsops("inventory.list", err))?;
        let mut files = filter.apply(records);
        sort_records(&mut files, key, order);
        let summary = summarize(&files);
        Ok(Listing { files, summary })
    })
    .await
    .map_err(|source| AppError::Join {
        operation: "inventory.list",
        source,
    })?
}

async fn deliver(
    config: &DeliveryConfig,
    args: &DeliverArgs,
    events: EventBus,
    metrics: Metrics,
) -> AppResult<DeliveryReport> {
    let allowed = args.requester.as_deref().map_or_else(
        || config.allowed_users.is_empty(),
        |requester| config.allowed_users.is_allowed(requester),
    );
    if !allowed {
        warn!(requester = ?args.requester, "delivery refused for requester");
        return Err(AppError::Forbidden {
            requester: args.requester.clone(),
        });
    }

    let request = if args.by_name {
        resolve_names(config, args.request()).await?
    } else {
        args.request()
    };
    let outbox = args
        .outbox
        .clone()
        .unwrap_or_else(|| default_outbox(config));
    let context = DeliveryContext::from_config(config, events, metrics);
    let orchestrator = DeliveryOrchestrator::new(context, Arc::new(DirectorySink::new(outbox)));
    orchestrator
        .spawn_delivery(request)
        .await
        .map_err(|source| AppError::Join {
            operation: "delivery.run",
            source,
        })
}

/// Replace each bare name with the first file of that name on the volume.
///
/// Names without a match are kept so the job reports them as unavailable.
async fn resolve_names(
    config: &DeliveryConfig,
    mut request: DeliveryRequest,
) -> AppResult<DeliveryRequest> {
    let root = config.root.clone();
    let names = std::mem::take(&mut request.target_paths);
    let resolved = tokio::task::spawn_blocking(move || {
        names
            .into_iter()
            .map(|name| {
                let found = find_by_name(&root, &name.to_string_lossy())
                    .map_err(|err| AppError::fsops("inventory.find_by_name", err))?;
                Ok(found.map_or(name, |record| record.absolute_path))
            })
            .collect::<AppResult<Vec<_>>>()
    })
    .await
    .map_err(|source| AppError::Join {
        operation: "inventory.find_by_name",
        source,
    })??;
    request.target_paths = resolved;
    Ok(request)
}

/// Outbox used when none is given; never the volume itself.
fn default_outbox(config: &DeliveryConfig) -> PathBuf {
    config.temp_root.join(DEFAULT_OUTBOX_DIR)
}

async fn sweep_once(
    config: &DeliveryConfig,
    events: EventBus,
    metrics: Metrics,
) -> AppResult<SweepReport> {
    reaper(config, events, metrics)
        .run_once()
        .await
        .map_err(|err| AppError::fsops("reaper.sweep", err))
}
