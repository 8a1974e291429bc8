//! Remote JSON fetching
//!
//! Every outbound call of the cache goes through [`JsonFetcher`], so caches can be
//! driven by [`StaticFetcher`] in tests and by [`HttpFetcher`] in production.

use crate::error::{DirectoryError, DirectoryResult};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Result of a (possibly conditional) fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh body, with the validator to send on the next conditional request
    Modified {
        body: Value,
        last_modified: Option<String>,
    },
    /// The server confirmed the cached copy is current
    NotModified,
}

#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// GET `url`, sending `If-Modified-Since: validator` when one is given
    async fn fetch(&self, url: &str, validator: Option<&str>) -> DirectoryResult<FetchOutcome>;

    /// Unconditional GET returning the parsed body
    async fn fetch_json(&self, url: &str) -> DirectoryResult<Value> {
        match self.fetch(url, None).await? {
            FetchOutcome::Modified { body, .. } => Ok(body),
            FetchOutcome::NotModified => Err(DirectoryError::fetch(
                url,
                "unexpected 304 for unconditional request",
            )),
        }
    }
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, validator: Option<&str>) -> DirectoryResult<FetchOutcome> {
        tracing::debug!(url = %url, validator = ?validator, "Fetching");

        let mut request = self.http.get(url).header(ACCEPT, "application/json");
        if let Some(validator) = validator {
            request = request.header(IF_MODIFIED_SINCE, validator);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::fetch(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let text = response
            .text()
            .await
            .map_err(|e| DirectoryError::fetch(url, e))?;
        let body = serde_json::from_str(&text).map_err(|e| DirectoryError::parse(url, e))?;

        Ok(FetchOutcome::Modified {
            body,
            last_modified,
        })
    }
}

// =============================================================================
// Scripted fetcher
// =============================================================================

/// One canned answer for a [`StaticFetcher`] route
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Json {
        body: Value,
        last_modified: Option<String>,
    },
    NotModified,
    Status(u16),
    Unreachable,
}

impl ScriptedResponse {
    pub fn json(body: Value) -> Self {
        ScriptedResponse::Json {
            body,
            last_modified: None,
        }
    }

    pub fn json_with_validator(body: Value, last_modified: impl Into<String>) -> Self {
        ScriptedResponse::Json {
            body,
            last_modified: Some(last_modified.into()),
        }
    }
}

/// Recorded request made against a [`StaticFetcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub url: String,
    pub validator: Option<String>,
}

/// In-memory fetcher answering from per-URL scripts
///
/// Each route is a queue of responses; the last one keeps answering once the
/// queue is down to a single entry. Unknown URLs fail as unreachable.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`
    pub fn respond(&self, url: impl Into<String>, response: ScriptedResponse) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Drop any queued responses for `url` and answer with `response` from now on
    pub fn replace(&self, url: impl Into<String>, response: ScriptedResponse) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), VecDeque::from([response]));
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.url == url)
            .count()
    }

    fn next_response(&self, url: &str) -> Option<ScriptedResponse> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl JsonFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, validator: Option<&str>) -> DirectoryResult<FetchOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FetchCall {
                url: url.to_string(),
                validator: validator.map(str::to_string),
            });

        match self.next_response(url) {
            Some(ScriptedResponse::Json {
                body,
                last_modified,
            }) => Ok(FetchOutcome::Modified {
                body,
                last_modified,
            }),
            Some(ScriptedResponse::NotModified) => Ok(FetchOutcome::NotModified),
            Some(ScriptedResponse::Status(status)) => Err(DirectoryError::Status {
                url: url.to_string(),
                status,
            }),
            Some(ScriptedResponse::Unreachable) | None => {
                Err(DirectoryError::fetch(url, "connection refused"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_fetcher_sticky_last_response() {
        let fetcher = StaticFetcher::new();
        fetcher
            .respond("http://a", ScriptedResponse::json(json!({"v": 1})))
            .respond("http://a", ScriptedResponse::Status(500));

        assert_eq!(fetcher.fetch_json("http://a").await.unwrap(), json!({"v": 1}));
        assert!(fetcher.fetch_json("http://a").await.is_err());
        assert!(fetcher.fetch_json("http://a").await.is_err());
        assert_eq!(fetcher.call_count("http://a"), 3);
    }

    #[tokio::test]
    async fn test_static_fetcher_records_validator() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("http://a", ScriptedResponse::NotModified);

        let outcome = fetcher.fetch("http://a", Some("Mon, 01 Jan 2024")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(
            fetcher.calls()[0].validator.as_deref(),
            Some("Mon, 01 Jan 2024")
        );
    }

    #[tokio::test]
    async fn test_unconditional_fetch_rejects_not_modified() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("http://a", ScriptedResponse::NotModified);
        assert!(matches!(
            fetcher.fetch_json("http://a").await,
            Err(DirectoryError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_route_is_unreachable() {
        let fetcher = StaticFetcher::new();
        let err = fetcher.fetch_json("http://nowhere").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
