//! Generic polling cache over a remote JSON resource
//!
//! [`RemoteSnapshot`] polls at most once per interval, revalidates with
//! `If-Modified-Since`, and never drops its last good value on failure.

use crate::clock::{CheckSchedule, Clock};
use crate::error::DirectoryError;
use crate::fetch::{FetchOutcome, JsonFetcher};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct SnapshotState<T> {
    value: Option<Arc<T>>,
    validator: Option<String>,
    schedule: CheckSchedule,
}

pub struct RemoteSnapshot<T> {
    url: String,
    interval: Duration,
    fetcher: Arc<dyn JsonFetcher>,
    clock: Arc<dyn Clock>,
    /// Held across the fetch so concurrent callers never issue a second request
    state: Mutex<SnapshotState<T>>,
}

impl<T> RemoteSnapshot<T>
where
    T: DeserializeOwned + Default + Send + Sync,
{
    pub fn new(
        url: impl Into<String>,
        interval: Duration,
        fetcher: Arc<dyn JsonFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            url: url.into(),
            interval,
            fetcher,
            clock,
            state: Mutex::new(SnapshotState {
                value: None,
                validator: None,
                schedule: CheckSchedule::default(),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current value, refreshed from the remote when the polling interval has elapsed
    ///
    /// Returns `T::default()` while nothing has ever been fetched successfully.
    pub async fn refresh(&self) -> Arc<T> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        if !state.schedule.is_due(now) {
            return current(&state);
        }
        state.schedule.schedule_after(now, self.interval);

        let validator = match state.value {
            Some(_) => state.validator.clone(),
            None => None,
        };

        match self.fetcher.fetch(&self.url, validator.as_deref()).await {
            Ok(FetchOutcome::NotModified) => {
                tracing::debug!(url = %self.url, "Remote snapshot not modified");
            }
            Ok(FetchOutcome::Modified {
                body,
                last_modified,
            }) => match serde_json::from_value::<T>(body) {
                Ok(value) => {
                    tracing::info!(url = %self.url, last_modified = ?last_modified, "Remote snapshot updated");
                    state.value = Some(Arc::new(value));
                    state.validator = last_modified;
                }
                Err(e) => {
                    let err = DirectoryError::parse(format!("snapshot {}", self.url), e);
                    tracing::warn!(error = %err, "Keeping previous remote snapshot");
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "Keeping previous remote snapshot");
            }
        }

        current(&state)
    }

    /// Last good value without touching the network
    pub async fn cached(&self) -> Option<Arc<T>> {
        self.state.lock().await.value.clone()
    }
}

fn current<T: Default>(state: &SnapshotState<T>) -> Arc<T> {
    state
        .value
        .clone()
        .unwrap_or_else(|| Arc::new(T::default()))
}
