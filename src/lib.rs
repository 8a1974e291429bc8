//! Directory context enrichment for an indoor-navigation dialog assistant
//!
//! Keeps a polled copy of the facility directory and a remote conversation
//! config, derives per-language lookup maps from them, filters those maps per
//! request by accessibility and availability, and resolves `@@name##`
//! placeholders in dialog output.
//!
//! ```ignore
//! let service = DirectoryContextService::new(ServiceConfig::from_env()?)?;
//! if let Some(patch) = service.enrich("en", Some("user_wheelchair"), None).await {
//!     patch.merge_into(&mut request_context);
//! }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod directory;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod remote_config;
pub mod resolve;
pub mod service;
pub mod snapshot;
pub mod text_filter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DirectoryConfig, Location, RepeatPhrases, ServiceConfig};
pub use context::{strip_context_fields, ContextPatch, CONTEXT_FIELDS};
pub use error::{DirectoryError, DirectoryResult};
pub use fetch::{FetchOutcome, HttpFetcher, JsonFetcher, ScriptedResponse, StaticFetcher};
pub use remote_config::RemoteConfig;
pub use resolve::{ResolvedText, TranslationMap};
pub use service::DirectoryContextService;
pub use snapshot::RemoteSnapshot;
