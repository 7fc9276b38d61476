use serde::Serialize;
use stockroom_core::models::OutboxCounts;
use stockroom_core::sync::{SyncScheduler, TcpProbe};
use stockroom_core::SyncResult;

use crate::commands::common::{display_path, Settings};
use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    PushOnly,
    PullOnly,
}

impl SyncMode {
    pub const fn from_flags(push_only: bool, pull_only: bool) -> Self {
        match (push_only, pull_only) {
            (true, _) => Self::PushOnly,
            (false, true) => Self::PullOnly,
            (false, false) => Self::Full,
        }
    }
}

pub async fn run_sync(mode: SyncMode, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    let engine = settings.sync_engine(&store)?;

    let result = match mode {
        SyncMode::Full => engine.run_sync().await,
        SyncMode::PushOnly => engine.push_outbox().await,
        SyncMode::PullOnly => engine.pull_changes().await,
    };
    println!("{}", describe_result(mode, &result));
    ensure_ok(&result)
}

pub async fn run_watch(settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    let engine = settings.sync_engine(&store)?;
    let probe = TcpProbe::from_base_url(
        settings.config.require_api_base_url()?,
        settings.config.request_timeout(),
    )?;
    let scheduler = SyncScheduler::new(engine, probe, settings.config.sync_interval());

    println!(
        "Syncing every {}s; press Ctrl-C to stop",
        scheduler.interval().as_secs()
    );
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", error);
            std::future::pending::<()>().await;
        }
    };
    let cycles = scheduler
        .run_until(shutdown, |result| {
            println!("{}", describe_result(SyncMode::Full, result));
        })
        .await;
    println!("Stopped after {cycles} sync cycles");
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub device_id: String,
    pub last_sync: Option<String>,
    pub outbox: OutboxCounts,
}

pub async fn run_status(as_json: bool, settings: &Settings) -> Result<(), CliError> {
    let store = settings.open_store().await?;
    let report = StatusReport {
        db_path: display_path(&settings.db_path),
        device_id: store.device_id().await?,
        last_sync: store.last_sync().await?,
        outbox: store.outbox_counts().await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    vec![
        format!("Database:  {}", report.db_path),
        format!("Device:    {}", report.device_id),
        format!(
            "Last sync: {}",
            report.last_sync.as_deref().unwrap_or("never")
        ),
        format!(
            "Outbox:    {} pending, {} failed, {} sent",
            report.outbox.pending, report.outbox.failed, report.outbox.sent
        ),
    ]
}

pub fn describe_result(mode: SyncMode, result: &SyncResult) -> String {
    if !result.ok {
        let reason = result.reason.map_or("unknown", |reason| reason.as_str());
        return format!("Sync failed ({reason})");
    }
    match (mode, result.count) {
        (SyncMode::PushOnly, Some(count)) => format!("Pushed {count} events"),
        (SyncMode::PullOnly, _) => "Pulled server changes".to_string(),
        _ => "Sync completed".to_string(),
    }
}

fn ensure_ok(result: &SyncResult) -> Result<(), CliError> {
    match result.reason {
        Some(reason) if !result.ok => Err(CliError::Sync(reason)),
        _ => Ok(()),
    }
}
