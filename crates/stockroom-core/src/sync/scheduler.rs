//! Periodic sync driver.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::{ConnectivityCheck, SyncEngine, SyncResult};
use crate::http::Network;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15);
const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a sync cycle on every tick while the connectivity check reports online.
pub struct SyncScheduler<N, C> {
    engine: SyncEngine<N>,
    connectivity: C,
    interval: Duration,
}

impl<N: Network, C: ConnectivityCheck> SyncScheduler<N, C> {
    pub fn new(engine: SyncEngine<N>, connectivity: C, interval: Duration) -> Self {
        Self {
            engine,
            connectivity,
            interval: interval.max(MIN_SYNC_INTERVAL),
        }
    }

    pub const fn engine(&self) -> &SyncEngine<N> {
        &self.engine
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// One scheduled attempt; `None` when offline.
    pub async fn tick(&self) -> Option<SyncResult> {
        if !self.connectivity.is_online().await {
            tracing::debug!("Offline, skipping scheduled sync");
            return None;
        }
        Some(self.engine.run_sync().await)
    }

    /// Tick until `shutdown` resolves; returns the number of cycles run.
    pub async fn run_until<F>(&self, shutdown: F, mut on_result: impl FnMut(&SyncResult)) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("Sync scheduler started (every {:?})", self.interval);
        let mut cycles = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Some(result) = self.tick().await {
                        cycles += 1;
                        on_result(&result);
                    }
                }
            }
        }
        tracing::info!("Sync scheduler stopped after {} cycles", cycles);
        cycles
    }
}
