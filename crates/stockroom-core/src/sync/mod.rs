//! Outbox replication: push local change events, then pull server snapshots.
//!
//! A cycle never fails loudly. Every outcome is reported as a [`SyncResult`]
//! so callers can retry on their own schedule.

mod connectivity;
mod scheduler;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::is_expired;
use crate::http::{Network, PushEvent, PushRequest, PushStatus, SyncApiClient, TransportError};
use crate::models::OutboxStatus;
use crate::services::{EventTransition, LocalStore};
use crate::util::{iso_timestamp_now, unix_timestamp_now};

pub use connectivity::{AlwaysOnline, ConnectivityCheck, TcpProbe};
pub use scheduler::{SyncScheduler, DEFAULT_SYNC_INTERVAL};

/// Why a cycle stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFailure {
    /// No credential, or the credential has expired
    Token,
    /// Unreachable server, timeout, HTTP error or malformed body
    Network,
    /// The local store failed
    Storage,
}

impl SyncFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Network => "network",
            Self::Storage => "storage",
        }
    }
}

/// Outcome of a push, pull or full cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SyncFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl SyncResult {
    pub const fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
            count: None,
        }
    }

    pub const fn ok_with_count(count: usize) -> Self {
        Self {
            ok: true,
            reason: None,
            count: Some(count),
        }
    }

    pub const fn failed(reason: SyncFailure) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            count: None,
        }
    }
}

enum CycleError {
    Token,
    Transport(TransportError),
    Storage(crate::Error),
}

impl From<TransportError> for CycleError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl From<crate::Error> for CycleError {
    fn from(error: crate::Error) -> Self {
        Self::Storage(error)
    }
}

impl CycleError {
    fn into_result(self, stage: &str) -> SyncResult {
        match self {
            Self::Token => {
                tracing::info!("Skipping {}: missing or expired access token", stage);
                SyncResult::failed(SyncFailure::Token)
            }
            Self::Transport(error) => {
                tracing::warn!("{} failed: {}", stage, error);
                SyncResult::failed(SyncFailure::Network)
            }
            Self::Storage(error) => {
                tracing::error!("{} failed on local store: {}", stage, error);
                SyncResult::failed(SyncFailure::Storage)
            }
        }
    }
}

/// Drives replication between the local store and the sync API.
pub struct SyncEngine<N> {
    store: LocalStore,
    api: SyncApiClient<N>,
    cycle: Mutex<()>,
}

impl<N: Network> SyncEngine<N> {
    pub fn new(store: LocalStore, api: SyncApiClient<N>) -> Self {
        Self {
            store,
            api,
            cycle: Mutex::new(()),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn api(&self) -> &SyncApiClient<N> {
        &self.api
    }

    /// Push pending events, then pull server changes.
    ///
    /// Overlapping calls wait for the running cycle and then run their own.
    pub async fn run_sync(&self) -> SyncResult {
        let _cycle = self.cycle.lock().await;
        let outcome = async {
            let token = self.valid_token().await?;
            let pushed = self.push_with(&token).await?;
            let pulled = self.pull_with(&token).await?;
            Ok::<_, CycleError>((pushed, pulled))
        }
        .await;

        match outcome {
            Ok((pushed, pulled)) => {
                tracing::info!("Sync complete: pushed {} events, pulled {} records", pushed, pulled);
                SyncResult::ok()
            }
            Err(error) => error.into_result("sync"),
        }
    }

    /// Push pending events only.
    pub async fn push_outbox(&self) -> SyncResult {
        let _cycle = self.cycle.lock().await;
        let outcome = async {
            let token = self.valid_token().await?;
            self.push_with(&token).await
        }
        .await;

        match outcome {
            Ok(pushed) => SyncResult::ok_with_count(pushed),
            Err(error) => error.into_result("push"),
        }
    }

    /// Pull server changes only.
    pub async fn pull_changes(&self) -> SyncResult {
        let _cycle = self.cycle.lock().await;
        let outcome = async {
            let token = self.valid_token().await?;
            self.pull_with(&token).await
        }
        .await;

        match outcome {
            Ok(_) => SyncResult::ok(),
            Err(error) => error.into_result("pull"),
        }
    }

    async fn valid_token(&self) -> Result<String, CycleError> {
        match self.store.access_token().await? {
            Some(token) if !is_expired(&token, unix_timestamp_now()) => Ok(token),
            _ => Err(CycleError::Token),
        }
    }

    async fn push_with(&self, token: &str) -> Result<usize, CycleError> {
        let pending = self.store.list_pending().await?;
        if pending.is_empty() {
            tracing::debug!("Outbox empty, nothing to push");
            return Ok(0);
        }

        let batch = PushRequest {
            device_id: self.store.device_id().await?,
            events: pending.iter().map(PushEvent::from).collect(),
        };
        let response = self.api.push(token, &batch).await?;

        let retries = pending
            .iter()
            .map(|event| (event.event_id.as_str(), event.retry_count))
            .collect::<HashMap<_, _>>();
        let transitions = response
            .results
            .iter()
            .filter_map(|result| {
                let Some(&retry_count) = retries.get(result.event_id.as_str()) else {
                    tracing::debug!("Ignoring push result for unknown event {}", result.event_id);
                    return None;
                };
                let transition = match PushStatus::from_wire(&result.status) {
                    PushStatus::Applied | PushStatus::Duplicate => EventTransition {
                        event_id: result.event_id.clone(),
                        status: OutboxStatus::Sent,
                        retry_count: 0,
                    },
                    PushStatus::Rejected(status) => {
                        tracing::warn!("Server rejected event {} ({})", result.event_id, status);
                        EventTransition {
                            event_id: result.event_id.clone(),
                            status: OutboxStatus::Failed,
                            retry_count: retry_count.saturating_add(1),
                        }
                    }
                };
                Some(transition)
            })
            .collect::<Vec<_>>();

        let server_time = response.server_time.unwrap_or_else(iso_timestamp_now);
        self.store
            .record_push_results(&transitions, &server_time)
            .await?;

        tracing::info!("Pushed {} outbox events", pending.len());
        Ok(pending.len())
    }

    async fn pull_with(&self, token: &str) -> Result<usize, CycleError> {
        let since = self.store.last_sync().await?;
        let response = self.api.pull(token, since.as_deref()).await?;

        let server_time = response
            .server_time
            .clone()
            .unwrap_or_else(iso_timestamp_now);
        let written = self
            .store
            .apply_remote_changes(&response.into_changes(), &server_time)
            .await?;

        tracing::info!("Pulled {} records", written);
        Ok(written)
    }
}
