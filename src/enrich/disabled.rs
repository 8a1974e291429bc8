//! Out-of-service node set
//!
//! Refreshed on its own cadence (ten minutes by default), independent of the
//! directory epoch.

use crate::clock::{CheckSchedule, Clock};
use crate::directory::info_map::{InfoEntry, InfoMap};
use crate::error::DirectoryError;
use crate::fetch::JsonFetcher;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Node IDs currently reported out of service
pub type DisabledNodeSet = HashSet<String>;

#[derive(Default)]
struct DisabledState {
    nodes: Option<Arc<DisabledNodeSet>>,
    schedule: CheckSchedule,
}

pub struct DisabledNodeCache {
    url: String,
    interval: Duration,
    fetcher: Arc<dyn JsonFetcher>,
    clock: Arc<dyn Clock>,
    state: Mutex<DisabledState>,
}

impl DisabledNodeCache {
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
            state: Mutex::new(DisabledState::default()),
        }
    }

    /// Current set, refetched when the window has elapsed
    ///
    /// `None` until the first successful fetch.
    pub async fn refresh(&self) -> Option<Arc<DisabledNodeSet>> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        if state.schedule.is_due(now) {
            state.schedule.schedule_after(now, self.interval);
            let fetched = self
                .fetcher
                .fetch_json(&self.url)
                .await
                .and_then(|body| {
                    serde_json::from_value::<DisabledNodeSet>(body)
                        .map_err(|e| DirectoryError::parse("disabled nodes", e))
                });
            match fetched {
                Ok(nodes) => {
                    tracing::info!(count = nodes.len(), "Disabled node set refreshed");
                    state.nodes = Some(Arc::new(nodes));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Keeping previous disabled node set");
                }
            }
        }
        state.nodes.clone()
    }
}

/// An entry is disabled iff it has nodes and every one of them is disabled
pub fn is_entry_disabled(entry: &InfoEntry, disabled: &DisabledNodeSet) -> bool {
    !entry.nodes.is_empty() && entry.nodes.iter().all(|node| disabled.contains(node))
}

/// Names of every fully-disabled entry, in info-map order
pub fn disabled_names(info_map: &InfoMap, disabled: &DisabledNodeSet) -> Vec<String> {
    info_map
        .values()
        .filter(|entry| is_entry_disabled(entry, disabled))
        .map(|entry| entry.name.clone())
        .collect()
}
