//! Per-language facility index
//!
//! Flattens one language's directory tree into `name → InfoEntry`, applies the
//! remote alias table, and builds the major/sub category maps.

use super::dictionary::{NameDictionary, CATEGORY_PREFIX};
use super::tree::{split_nodes, CategorySource, FacilityLeaf, LanguageDirectory};
use crate::remote_config::AliasRecord;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free node IDs; serialized pipe-joined
pub type NodeList = IndexSet<String>;

/// Canonical record for one facility name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_short: Option<String>,
    #[serde(default, with = "pipe_joined")]
    pub nodes: NodeList,
    /// `user_*` accessibility flags; an absent mode counts as accessible
    #[serde(flatten)]
    pub accessibility: IndexMap<String, bool>,
}

impl InfoEntry {
    fn from_leaf(leaf: &FacilityLeaf) -> Self {
        let mut entry = InfoEntry {
            name: leaf.title.clone(),
            pron: leaf.title_pron.clone(),
            pr_short: leaf.short_description.clone(),
            ..Default::default()
        };
        entry.merge_leaf(leaf);
        entry
    }

    /// Fold a same-titled leaf into this entry
    fn merge_leaf(&mut self, leaf: &FacilityLeaf) {
        self.nodes.extend(leaf.node_ids().map(str::to_string));
        if self.pron.is_none() {
            self.pron = leaf.title_pron.clone();
        }
        if self.pr_short.is_none() {
            self.pr_short = leaf.short_description.clone();
        }
        for (mode, flag) in leaf.accessibility_flags() {
            self.accessibility.insert(mode.to_string(), flag);
        }
    }

    /// Whether the entry may be shown to `user_mode`
    pub fn accessible_to(&self, user_mode: &str) -> bool {
        self.accessibility.get(user_mode).copied().unwrap_or(true)
    }

    pub fn joined_nodes(&self) -> String {
        self.nodes.iter().map(String::as_str).collect::<Vec<_>>().join("|")
    }
}

pub(crate) mod pipe_joined {
    use super::NodeList;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nodes: &NodeList, serializer: S) -> Result<S::Ok, S::Error> {
        let joined = nodes.iter().map(String::as_str).collect::<Vec<_>>().join("|");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeList, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(super::split_nodes(&joined).map(str::to_string).collect())
    }
}

/// `name → entry`, in first-seen order
pub type InfoMap = IndexMap<String, InfoEntry>;

/// `target name → alias names`
pub type AliasMap = IndexMap<String, Vec<String>>;

/// `display label → member names`
pub type CategoryMap = IndexMap<String, IndexSet<String>>;

/// Cached per-language output, rebuilt once per directory epoch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoMaps {
    pub info_map: InfoMap,
    pub alias_map: AliasMap,
    pub maj_category_map: CategoryMap,
    pub sub_category_map: CategoryMap,
}

pub fn build_info_maps(
    directory: &LanguageDirectory,
    aliases: &[AliasRecord],
    names: &NameDictionary,
) -> InfoMaps {
    let mut info_map = scan_entries(directory);
    let alias_map = apply_aliases(&mut info_map, aliases);

    let maj_category_map = build_category_map(
        directory.major_categories.as_ref(),
        &alias_map,
        names,
        CATEGORY_PREFIX,
    );
    let sub_category_map = build_category_map(
        directory.sub_categories.as_ref(),
        &alias_map,
        names,
        CATEGORY_PREFIX,
    );

    InfoMaps {
        info_map,
        alias_map,
        maj_category_map,
        sub_category_map,
    }
}

/// Depth-first scan; same-titled leaves merge into one entry
fn scan_entries(directory: &LanguageDirectory) -> InfoMap {
    let mut info_map = InfoMap::new();
    directory.tree.visit_leaves(&mut |leaf| match info_map.get_mut(&leaf.title) {
        Some(entry) => entry.merge_leaf(leaf),
        None => {
            info_map.insert(leaf.title.clone(), InfoEntry::from_leaf(leaf));
        }
    });
    info_map
}

fn apply_aliases(info_map: &mut InfoMap, aliases: &[AliasRecord]) -> AliasMap {
    let mut alias_map = AliasMap::new();

    for record in aliases {
        let (Some(alias), Some(target)) = (non_empty(&record.name), non_empty(&record.dest_name))
        else {
            continue;
        };
        let Some(mut entry) = info_map.get(target).cloned() else {
            tracing::debug!(alias = %alias, target = %target, "Alias target not in directory");
            continue;
        };

        let aliases_of_target = alias_map.entry(target.to_string()).or_default();
        if !aliases_of_target.iter().any(|a| a == alias) {
            aliases_of_target.push(alias.to_string());
        }

        entry.name = alias.to_string();
        entry.pron = Some(non_empty(&record.pron).unwrap_or(alias).to_string());
        if let Some(previous) = info_map.get(alias) {
            entry.nodes.extend(previous.nodes.iter().cloned());
        }
        info_map.insert(alias.to_string(), entry);
    }

    alias_map
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Translate raw keys to display labels and expand members through the alias map
///
/// Expansion is one level: a member pulls in its own aliases, not theirs.
pub fn build_category_map(
    source: Option<&CategorySource>,
    aliases: &AliasMap,
    dictionary: &NameDictionary,
    prefix: &str,
) -> CategoryMap {
    let mut map = CategoryMap::new();
    let Some(source) = source else {
        return map;
    };

    for (key, members) in source {
        let names = map
            .entry(dictionary.label(prefix, key).to_string())
            .or_default();
        for member in members {
            names.insert(member.clone());
            if let Some(alias_names) = aliases.get(member) {
                names.extend(alias_names.iter().cloned());
            }
        }
    }
    map
}
