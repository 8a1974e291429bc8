//! Directory payload model
//!
//! The directory provider returns one object per language plus a `last_updated`
//! stamp. Each language holds a recursive section/item tree of facility
//! entries and the raw category, tag and building groupings.

use crate::error::{DirectoryError, DirectoryResult};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Key of the embedded version stamp in the directory payload
pub const VERSION_STAMP_KEY: &str = "last_updated";

/// Prefix of per-user-mode accessibility flags on facility entries
pub const USER_MODE_PREFIX: &str = "user_";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryTree {
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub items: Vec<DirectoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirectoryItem {
    /// Nested sub-tree
    Content { content: DirectoryTree },
    /// Facility entry
    Leaf(FacilityLeaf),
    /// Anything else the provider sends; skipped by the scan
    Unrecognized(serde::de::IgnoredAny),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacilityLeaf {
    pub title: String,
    /// Pipe-separated node IDs
    #[serde(rename = "nodeID", default)]
    pub node_id: String,
    #[serde(rename = "titlePron", default)]
    pub title_pron: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

impl FacilityLeaf {
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        split_nodes(&self.node_id)
    }

    /// `user_*` flags carried by the entry (e.g. `user_wheelchair: false`)
    pub fn accessibility_flags(&self) -> impl Iterator<Item = (&str, bool)> {
        self.attributes.iter().filter_map(|(key, value)| {
            if key.starts_with(USER_MODE_PREFIX) {
                value.as_bool().map(|flag| (key.as_str(), flag))
            } else {
                None
            }
        })
    }
}

pub(crate) fn split_nodes(joined: &str) -> impl Iterator<Item = &str> {
    joined.split('|').filter(|node| !node.is_empty())
}

impl DirectoryTree {
    /// Depth-first visit of every facility leaf
    pub fn visit_leaves<'a>(&'a self, visit: &mut impl FnMut(&'a FacilityLeaf)) {
        for section in &self.sections {
            for item in &section.items {
                match item {
                    DirectoryItem::Content { content } => content.visit_leaves(visit),
                    DirectoryItem::Leaf(leaf) => visit(leaf),
                    DirectoryItem::Unrecognized(_) => {}
                }
            }
        }
    }
}

/// Raw `key → member names` grouping as delivered by the provider
pub type CategorySource = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Deserialize)]
pub struct FloorFacility {
    pub title: String,
    #[serde(default)]
    pub node: String,
}

/// `building → floor → facilities`
pub type BuildingFloorSource = IndexMap<String, IndexMap<String, Vec<FloorFacility>>>;

/// Category and tag groupings restricted to one building
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildingCategories {
    #[serde(default)]
    pub major_categories: Option<CategorySource>,
    #[serde(default)]
    pub sub_categories: Option<CategorySource>,
    #[serde(default)]
    pub tags: Option<CategorySource>,
}

/// Everything the directory carries for one language
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguageDirectory {
    #[serde(flatten)]
    pub tree: DirectoryTree,
    #[serde(default)]
    pub major_categories: Option<CategorySource>,
    #[serde(default)]
    pub sub_categories: Option<CategorySource>,
    #[serde(default)]
    pub tags: Option<CategorySource>,
    #[serde(default)]
    pub building_floors: Option<BuildingFloorSource>,
    #[serde(default)]
    pub building_group: Option<IndexMap<String, BuildingCategories>>,
}

/// One directory payload: every language plus the version stamp
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    languages: HashMap<String, Arc<LanguageDirectory>>,
    version_stamp: Value,
}

impl DirectorySnapshot {
    /// Build from the provider payload; languages that fail to parse are skipped
    pub fn from_value(payload: Value) -> DirectoryResult<Self> {
        let Value::Object(object) = payload else {
            return Err(DirectoryError::parse(
                "directory payload",
                serde::de::Error::custom("expected a JSON object"),
            ));
        };

        let mut snapshot = DirectorySnapshot::default();
        for (key, value) in object {
            if key == VERSION_STAMP_KEY {
                snapshot.version_stamp = value;
                continue;
            }
            if !value.is_object() {
                continue;
            }
            match serde_json::from_value::<LanguageDirectory>(value) {
                Ok(directory) => {
                    snapshot.languages.insert(key, Arc::new(directory));
                }
                Err(e) => {
                    tracing::warn!(lang = %key, error = %e, "Skipping malformed directory language");
                }
            }
        }
        Ok(snapshot)
    }

    pub fn language(&self, lang: &str) -> Option<Arc<LanguageDirectory>> {
        self.languages.get(lang).cloned()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn version_stamp(&self) -> &Value {
        &self.version_stamp
    }
}
