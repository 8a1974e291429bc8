//! Directory context service
//!
//! One instance is shared by every request. It owns the directory cache, the
//! remote configuration snapshot, the disabled-node cache, the static name
//! dictionaries and the per-language derived maps, and exposes the two calls a
//! dialog turn needs: [`DirectoryContextService::enrich`] before the engine is
//! called and [`DirectoryContextService::annotate_response`] after it answers.

use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::context::ContextPatch;
use crate::directory::cache::{DirectoryCache, EpochSnapshot};
use crate::directory::dictionary::NameDictionaries;
use crate::directory::info_map::{build_info_maps, AliasMap, InfoMaps};
use crate::directory::tree::LanguageDirectory;
use crate::enrich::disabled::DisabledNodeCache;
use crate::enrich::dynamic::{build_context_patch, DynamicInputs, DEFAULT_USER_MODE};
use crate::enrich::sorter::sort_context_patch;
use crate::fetch::{HttpFetcher, JsonFetcher};
use crate::remote_config::RemoteConfig;
use crate::resolve::{
    annotate_response, build_translation_map, resolve_text, response_conversion, ResolvedText,
    TranslationMap,
};
use crate::snapshot::RemoteSnapshot;
use crate::text_filter::{preprocess, TextFilter};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type InfoMapsCell = Arc<OnceCell<Arc<InfoMaps>>>;

/// Per-language info maps for one directory epoch
#[derive(Default)]
struct DerivedMaps {
    epoch: u64,
    per_language: HashMap<String, InfoMapsCell>,
}

pub struct DirectoryContextService {
    directory: DirectoryCache,
    remote_config: Option<RemoteSnapshot<RemoteConfig>>,
    disabled_nodes: DisabledNodeCache,
    dictionaries: NameDictionaries,
    derived: Mutex<DerivedMaps>,
    translations: Mutex<HashMap<String, Arc<TranslationMap>>>,
    text_filter: TextFilter,
}

impl DirectoryContextService {
    /// Production wiring: reqwest fetcher and the system clock
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(config.http_timeout())?);
        Ok(Self::with_parts(&config, fetcher, Arc::new(SystemClock)))
    }

    pub fn with_parts(
        config: &ServiceConfig,
        fetcher: Arc<dyn JsonFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let remote_config = config.conversation_config.as_ref().map(|url| {
            RemoteSnapshot::new(
                url.clone(),
                config.remote_config_check_interval(),
                fetcher.clone(),
                clock.clone(),
            )
        });
        if remote_config.is_none() {
            tracing::info!("No remote conversation config; aliases and translations disabled");
        }

        Self {
            directory: DirectoryCache::new(
                &config.directory,
                config.directory_check_interval(),
                fetcher.clone(),
                clock.clone(),
            ),
            disabled_nodes: DisabledNodeCache::new(
                config.directory.disabled_nodes_url(),
                config.disabled_nodes_check_interval(),
                fetcher,
                clock,
            ),
            remote_config,
            dictionaries: NameDictionaries::new(config.data_dir.clone()),
            derived: Mutex::new(DerivedMaps::default()),
            translations: Mutex::new(HashMap::new()),
            text_filter: TextFilter::new(&config.repeat),
        }
    }

    /// Static category dictionaries, e.g. for preloading
    pub fn dictionaries(&self) -> &NameDictionaries {
        &self.dictionaries
    }

    /// Current directory epoch; zero until the first directory load
    pub async fn directory_epoch(&self) -> u64 {
        self.directory.epoch().await
    }

    async fn remote_config(&self) -> Arc<RemoteConfig> {
        match &self.remote_config {
            Some(snapshot) => snapshot.refresh().await,
            None => Arc::new(RemoteConfig::default()),
        }
    }

    /// Context fields for one dialog turn
    ///
    /// `None` when no directory data has ever been loaded for `lang`; the turn
    /// then proceeds without directory context.
    pub async fn enrich(
        &self,
        lang: &str,
        user_mode: Option<&str>,
        prior_alias_map: Option<&AliasMap>,
    ) -> Option<ContextPatch> {
        let current = self.directory.current().await?;
        let Some(directory) = current.language(lang) else {
            tracing::debug!(lang = %lang, epoch = current.epoch, "No directory for language");
            return None;
        };
        let config = self.remote_config().await;
        let info_maps = self.info_maps_for(lang, &current, &directory, &config).await;
        let disabled_nodes = self.disabled_nodes.refresh().await;
        let names = self.dictionaries.get(lang).await;
        let tag_names = config.tag_names(lang);
        let hidden_names = config.hidden_names(lang);
        let building_groups = config.building_groups();

        let mut patch = build_context_patch(&DynamicInputs {
            directory: &directory,
            info_maps: &info_maps,
            alias_map: prior_alias_map.unwrap_or(&info_maps.alias_map),
            names: &names,
            tag_names: &tag_names,
            remote_hidden_names: &hidden_names,
            building_groups: &building_groups,
            disabled_nodes: disabled_nodes.as_deref(),
            user_mode: user_mode.unwrap_or(DEFAULT_USER_MODE),
        });
        sort_context_patch(&mut patch);

        tracing::debug!(
            lang = %lang,
            epoch = current.epoch,
            entries = patch.info_map.len(),
            hidden = patch.hidden_names.len(),
            disabled = patch.disabled_nodes.len(),
            "Context enriched"
        );
        Some(patch)
    }

    /// Cached info maps for `lang`, building them if this epoch has none yet
    pub async fn info_maps(&self, lang: &str) -> Option<Arc<InfoMaps>> {
        let current = self.directory.current().await?;
        let directory = current.language(lang)?;
        let config = self.remote_config().await;
        Some(self.info_maps_for(lang, &current, &directory, &config).await)
    }

    async fn info_maps_for(
        &self,
        lang: &str,
        current: &EpochSnapshot,
        directory: &LanguageDirectory,
        config: &RemoteConfig,
    ) -> Arc<InfoMaps> {
        let cell = {
            let mut derived = self.derived.lock().await;
            if current.epoch > derived.epoch {
                tracing::info!(
                    from = derived.epoch,
                    to = current.epoch,
                    "Directory epoch changed; dropping derived maps"
                );
                derived.epoch = current.epoch;
                derived.per_language.clear();
            }
            if current.epoch < derived.epoch {
                // Snapshot already superseded: build for this request only
                None
            } else {
                Some(derived.per_language.entry(lang.to_string()).or_default().clone())
            }
        };

        let build = move || async move {
            let names = self.dictionaries.get(lang).await;
            let maps = build_info_maps(directory, &config.aliases(lang), &names);
            tracing::info!(
                lang = %lang,
                epoch = current.epoch,
                entries = maps.info_map.len(),
                aliases = maps.alias_map.len(),
                "Info maps built"
            );
            Arc::new(maps)
        };

        match cell {
            Some(cell) => cell.get_or_init(build).await.clone(),
            None => build().await,
        }
    }

    /// Translation map for `lang`, built once per process
    ///
    /// Languages without a translation table are retried on the next call.
    pub async fn translation_map(&self, lang: &str) -> Option<Arc<TranslationMap>> {
        if let Some(map) = self.translations.lock().await.get(lang) {
            return Some(map.clone());
        }

        let config = self.remote_config().await;
        let records = config.translations(lang)?;
        let map = Arc::new(build_translation_map(&records));

        let mut translations = self.translations.lock().await;
        let map = translations.entry(lang.to_string()).or_insert(map).clone();
        tracing::info!(lang = %lang, entries = map.len(), "Translation map cached");
        Some(map)
    }

    /// Display and speakable forms of dialog output text
    pub async fn resolve_response_text(
        &self,
        lang: &str,
        text: &str,
        request_context: &ContextPatch,
    ) -> ResolvedText {
        let translation = self.translation_map(lang).await;
        let conversion = response_conversion(request_context, None);
        resolve_text(lang, text, &conversion, translation.as_deref())
    }

    /// Resolve a dialog engine response in place; see [`crate::resolve::annotate_response`]
    pub async fn annotate_response(
        &self,
        lang: &str,
        response: &mut Value,
        request_context: &ContextPatch,
    ) -> bool {
        let translation = self.translation_map(lang).await;
        annotate_response(lang, response, request_context, translation.as_deref())
    }

    /// Apply the remote input rewrite rules
    pub async fn preprocess_text(&self, text: &str) -> String {
        let config = self.remote_config().await;
        preprocess(text, &config.preprocess_rules())
    }

    pub fn has_repeat_word(&self, text: &str) -> bool {
        self.text_filter.has_repeat_word(text)
    }
}
