//! Error handling for the directory context cache
//!
//! None of these errors reach the request path: every remote boundary catches
//! them, logs, and degrades to the previous value or to an empty default.

use thiserror::Error;

/// Failures raised at a remote-source boundary
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Transport-level failure (connect, TLS, timeout, body read)
    #[error("Fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// The remote answered with a status other than 200 / 304
    #[error("Fetch of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// A remote source returned malformed or unexpectedly shaped JSON
    #[error("Malformed {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// An expected key is absent from a remote document
    #[error("Missing key '{key}'")]
    MissingKey { key: String },
}

impl DirectoryError {
    pub fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        DirectoryError::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        DirectoryError::Parse {
            context: context.into(),
            source,
        }
    }

    pub fn missing_key(key: impl Into<String>) -> Self {
        DirectoryError::MissingKey { key: key.into() }
    }

    /// Missing keys degrade silently; everything else is worth a warning.
    pub fn is_missing_key(&self) -> bool {
        matches!(self, DirectoryError::MissingKey { .. })
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
