//! Remote configuration document
//!
//! A single JSON document, polled through [`crate::snapshot::RemoteSnapshot`],
//! carrying alias tables, translations, tag-name dictionaries, hidden names,
//! building groups and input rewrite rules. Every accessor degrades to an
//! empty value when its section is missing or malformed.

use crate::directory::dictionary::NameDictionary;
use crate::error::{DirectoryError, DirectoryResult};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Alternate display name for an existing directory entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AliasRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pron: Option<String>,
    #[serde(default)]
    pub dest_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranslationRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pron: Option<String>,
}

/// `group name → member buildings`, plus groups to drop from the output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildingGroupConfig {
    pub groups: IndexMap<String, Vec<String>>,
    pub disabled: Vec<String>,
    configured: bool,
}

impl BuildingGroupConfig {
    const DISABLE_KEY: &'static str = "disable";

    /// Entries that are not string lists are skipped individually
    fn from_object(object: &Map<String, Value>) -> Self {
        let mut config = BuildingGroupConfig {
            configured: !object.is_empty(),
            ..Default::default()
        };
        for (key, value) in object {
            let members: Vec<String> = match serde_json::from_value(value.clone()) {
                Ok(members) => members,
                Err(e) => {
                    let err = DirectoryError::parse(format!("building_group.{}", key), e);
                    tracing::warn!(error = %err, "Skipping malformed building group");
                    continue;
                }
            };
            if key == Self::DISABLE_KEY {
                config.disabled = members;
            } else {
                config.groups.insert(key.clone(), members);
            }
        }
        config
    }

    /// True when the remote document carries at least one building_group entry
    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RemoteConfig(Map<String, Value>);

impl RemoteConfig {
    pub fn new(document: Map<String, Value>) -> Self {
        Self(document)
    }

    fn section(&self, key: &str) -> DirectoryResult<&Value> {
        self.0.get(key).ok_or_else(|| DirectoryError::missing_key(key))
    }

    fn lang_section<S: DeserializeOwned>(&self, key: &str, lang: &str) -> DirectoryResult<S> {
        let value = self
            .section(key)?
            .get(lang)
            .ok_or_else(|| DirectoryError::missing_key(format!("{}.{}", key, lang)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| DirectoryError::parse(format!("remote config {}.{}", key, lang), e))
    }

    /// Alias table for `lang`
    pub fn aliases(&self, lang: &str) -> Vec<AliasRecord> {
        degrade(self.lang_section("aliases", lang)).unwrap_or_default()
    }

    /// Translation table for `lang`; `None` when the language has none
    pub fn translations(&self, lang: &str) -> Option<Vec<TranslationRecord>> {
        degrade(self.lang_section("translations", lang))
    }

    /// Tag-key → display label dictionary for `lang`
    pub fn tag_names(&self, lang: &str) -> NameDictionary {
        degrade(self.lang_section("tags", lang)).unwrap_or_default()
    }

    /// Names never shown in `lang`, regardless of accessibility
    pub fn hidden_names(&self, lang: &str) -> Vec<String> {
        degrade(self.lang_section("hidden_names", lang)).unwrap_or_default()
    }

    pub fn building_groups(&self) -> BuildingGroupConfig {
        let parsed = self.section("building_group").and_then(|value| match value {
            Value::Object(object) => Ok(BuildingGroupConfig::from_object(object)),
            other => Err(DirectoryError::parse(
                "building_group",
                serde::de::Error::custom(format!("expected object, found {}", other)),
            )),
        });
        degrade(parsed).unwrap_or_default()
    }

    /// `[from, to]` substring rewrites applied to user input
    pub fn preprocess_rules(&self) -> Vec<(String, String)> {
        let Some(rules) = degrade(self.section("preprocess").map(Value::clone)) else {
            return Vec::new();
        };
        rules
            .as_array()
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|rule| {
                        let pair = rule.as_array()?;
                        Some((
                            pair.first()?.as_str()?.to_string(),
                            pair.get(1)?.as_str()?.to_string(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn degrade<S>(result: DirectoryResult<S>) -> Option<S> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_missing_key() => {
            tracing::debug!(error = %err, "Remote config section absent");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring malformed remote config section");
            None
        }
    }
}
