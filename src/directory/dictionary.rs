//! Display-label dictionaries
//!
//! Raw category and tag keys are translated to display labels through a
//! per-language dictionary. The static category dictionaries are read from
//! `<data_dir>/categories/<lang>.json` once and kept for the process lifetime.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Prefix used by category keys in the static name dictionary
pub const CATEGORY_PREFIX: &str = "CAT_";

/// Key → display label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameDictionary {
    labels: HashMap<String, String>,
}

impl NameDictionary {
    /// Keep only the string-valued entries of a JSON object
    pub fn from_value(value: &Value) -> Self {
        let labels = value
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self { labels }
    }

    /// Display label for `prefix + key`, falling back to the raw key
    pub fn label<'a>(&'a self, prefix: &str, key: &'a str) -> &'a str {
        self.labels
            .get(&format!("{}{}", prefix, key))
            .map(String::as_str)
            .unwrap_or(key)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

impl<'de> Deserialize<'de> for NameDictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameDictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Process-lifetime store of the static per-language category dictionaries
pub struct NameDictionaries {
    root: Option<PathBuf>,
    loaded: Mutex<HashMap<String, Arc<NameDictionary>>>,
}

impl NameDictionaries {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Install a dictionary without touching the filesystem
    pub async fn preload(&self, lang: &str, dictionary: NameDictionary) {
        self.loaded
            .lock()
            .await
            .insert(lang.to_string(), Arc::new(dictionary));
    }

    /// Dictionary for `lang`; an unreadable file yields (and caches) an empty one
    pub async fn get(&self, lang: &str) -> Arc<NameDictionary> {
        let mut loaded = self.loaded.lock().await;
        if let Some(dictionary) = loaded.get(lang) {
            return dictionary.clone();
        }

        let dictionary = Arc::new(self.load(lang).await);
        loaded.insert(lang.to_string(), dictionary.clone());
        dictionary
    }

    async fn load(&self, lang: &str) -> NameDictionary {
        if !is_safe_lang(lang) {
            tracing::warn!(lang = %lang, "Refusing dictionary lookup for unsafe language tag");
            return NameDictionary::default();
        }
        let Some(root) = &self.root else {
            return NameDictionary::default();
        };

        let path = root.join("categories").join(format!("{}.json", lang));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "No category dictionary");
                return NameDictionary::default();
            }
        };
        match serde_json::from_str::<NameDictionary>(&text) {
            Ok(dictionary) => {
                tracing::info!(lang = %lang, entries = dictionary.len(), "Loaded category dictionary");
                dictionary
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed category dictionary");
                NameDictionary::default()
            }
        }
    }
}

fn is_safe_lang(lang: &str) -> bool {
    !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_with_prefix_and_fallback() {
        let dictionary = NameDictionary::from_value(&json!({
            "CAT_toilet": "Restrooms",
            "shop": "Shops",
            "count": 3
        }));
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.label(CATEGORY_PREFIX, "toilet"), "Restrooms");
        assert_eq!(dictionary.label(CATEGORY_PREFIX, "shop"), "shop");
        assert_eq!(dictionary.label("", "shop"), "Shops");
    }

    #[tokio::test]
    async fn test_loads_once_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("categories")).unwrap();
        let path = dir.path().join("categories").join("en.json");
        std::fs::write(&path, r#"{"CAT_food": "Food"}"#).unwrap();

        let dictionaries = NameDictionaries::new(Some(dir.path().to_path_buf()));
        let first = dictionaries.get("en").await;
        assert_eq!(first.label(CATEGORY_PREFIX, "food"), "Food");

        // Cached for the process lifetime even if the file changes
        std::fs::write(&path, r#"{"CAT_food": "Meals"}"#).unwrap();
        let second = dictionaries.get("en").await;
        assert_eq!(second.label(CATEGORY_PREFIX, "food"), "Food");
    }

    #[tokio::test]
    async fn test_missing_or_unsafe_dictionary_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dictionaries = NameDictionaries::new(Some(dir.path().to_path_buf()));
        assert!(dictionaries.get("fr").await.is_empty());
        assert!(dictionaries.get("../etc").await.is_empty());
    }
}
