//! Directory snapshot cache
//!
//! Polls a lightweight "last updated" marker at most once per interval and only
//! downloads the full directory when the marker differs from the stamp embedded
//! in the current snapshot. Every replacement bumps the invalidation epoch.

use super::tree::{DirectorySnapshot, LanguageDirectory};
use crate::clock::{CheckSchedule, Clock};
use crate::config::DirectoryConfig;
use crate::fetch::JsonFetcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Snapshot plus the epoch it belongs to
#[derive(Debug, Clone)]
pub struct EpochSnapshot {
    pub epoch: u64,
    pub snapshot: Arc<DirectorySnapshot>,
}

impl EpochSnapshot {
    pub fn language(&self, lang: &str) -> Option<Arc<LanguageDirectory>> {
        self.snapshot.language(lang)
    }
}

#[derive(Default)]
struct DirectoryState {
    current: Option<EpochSnapshot>,
    epoch: u64,
    schedule: CheckSchedule,
}

pub struct DirectoryCache {
    directory_url: String,
    last_updated_url: String,
    interval: Duration,
    fetcher: Arc<dyn JsonFetcher>,
    clock: Arc<dyn Clock>,
    state: Mutex<DirectoryState>,
}

impl DirectoryCache {
    pub fn new(
        config: &DirectoryConfig,
        interval: Duration,
        fetcher: Arc<dyn JsonFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory_url: config.directory_url(),
            last_updated_url: config.last_updated_url(),
            interval,
            fetcher,
            clock,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    /// Directory tree for `lang`, revalidating first when due
    pub async fn get(&self, lang: &str) -> Option<Arc<LanguageDirectory>> {
        self.current().await?.language(lang)
    }

    /// Current snapshot, revalidating first when due
    ///
    /// `None` only while no directory payload has ever been loaded.
    pub async fn current(&self) -> Option<EpochSnapshot> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        if state.current.is_none() || state.schedule.is_due(now) {
            state.schedule.schedule_after(now, self.interval);
            self.sync(&mut state).await;
        }
        state.current.clone()
    }

    /// Epoch of the current snapshot without touching the network
    pub async fn epoch(&self) -> u64 {
        self.state.lock().await.epoch
    }

    async fn sync(&self, state: &mut DirectoryState) {
        if let Some(current) = &state.current {
            match self.fetcher.fetch_json(&self.last_updated_url).await {
                Ok(marker) if &marker == current.snapshot.version_stamp() => {
                    tracing::debug!(epoch = current.epoch, "Directory unchanged");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Directory marker check failed; keeping snapshot");
                    return;
                }
            }
        }

        let payload = match self.fetcher.fetch_json(&self.directory_url).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "Directory fetch failed; keeping snapshot");
                return;
            }
        };
        match DirectorySnapshot::from_value(payload) {
            Ok(snapshot) => {
                state.epoch += 1;
                tracing::info!(
                    epoch = state.epoch,
                    stamp = %snapshot.version_stamp(),
                    languages = ?snapshot.languages().collect::<Vec<_>>(),
                    "Directory snapshot replaced"
                );
                state.current = Some(EpochSnapshot {
                    epoch: state.epoch,
                    snapshot: Arc::new(snapshot),
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Directory payload rejected; keeping snapshot");
            }
        }
    }
}
