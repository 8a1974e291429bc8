//! Dialog request-context fields produced by enrichment
//!
//! Field names are the ones the dialog workspace reads, so [`ContextPatch`]
//! serializes straight into the engine's context object.

use crate::directory::info_map::{AliasMap, CategoryMap, InfoMap};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `building → floor → facility titles`
pub type BuildingFloorMap = IndexMap<String, IndexMap<String, IndexSet<String>>>;

/// Category and tag maps scoped to one building (or building group)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingMaps {
    #[serde(default)]
    pub maj_category_map: CategoryMap,
    #[serde(default)]
    pub maj_category_map_available: CategoryMap,
    #[serde(default)]
    pub sub_category_map: CategoryMap,
    #[serde(default)]
    pub sub_category_map_available: CategoryMap,
    #[serde(default)]
    pub tags_map: CategoryMap,
    #[serde(default)]
    pub tags_map_available: CategoryMap,
}

impl BuildingMaps {
    pub fn maps(&self) -> [&CategoryMap; 6] {
        [
            &self.maj_category_map,
            &self.maj_category_map_available,
            &self.sub_category_map,
            &self.sub_category_map_available,
            &self.tags_map,
            &self.tags_map_available,
        ]
    }

    pub fn maps_mut(&mut self) -> [&mut CategoryMap; 6] {
        [
            &mut self.maj_category_map,
            &mut self.maj_category_map_available,
            &mut self.sub_category_map,
            &mut self.sub_category_map_available,
            &mut self.tags_map,
            &mut self.tags_map_available,
        ]
    }

    /// Key-wise union of every map, deduplicating names
    pub fn union_with(&mut self, other: &BuildingMaps) {
        for (into, from) in self.maps_mut().into_iter().zip(other.maps()) {
            for (key, names) in from {
                into.entry(key.clone())
                    .or_default()
                    .extend(names.iter().cloned());
            }
        }
    }
}

/// `building or group name → scoped maps`
pub type BuildingGroupMap = IndexMap<String, BuildingMaps>;

/// Every context field one enrichment pass contributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPatch {
    #[serde(default)]
    pub info_map: InfoMap,
    #[serde(default)]
    pub alias_map: AliasMap,
    #[serde(default)]
    pub maj_category_map: CategoryMap,
    #[serde(default)]
    pub maj_category_map_available: CategoryMap,
    #[serde(default)]
    pub sub_category_map: CategoryMap,
    #[serde(default)]
    pub sub_category_map_available: CategoryMap,
    #[serde(default)]
    pub tags_map: CategoryMap,
    #[serde(default)]
    pub tags_map_available: CategoryMap,
    /// Names whose every node is out of service
    #[serde(default)]
    pub disabled_nodes: Vec<String>,
    #[serde(default)]
    pub hidden_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_floor_map: Option<BuildingFloorMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_floor_map_available: Option<BuildingFloorMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_group_map: Option<BuildingGroupMap>,
    #[serde(default)]
    pub whole_maj_map: CategoryMap,
    #[serde(default)]
    pub whole_map: CategoryMap,
    #[serde(default)]
    pub whole_tags_map: CategoryMap,
}

/// Every context key owned by enrichment
pub const CONTEXT_FIELDS: &[&str] = &[
    "info_map",
    "alias_map",
    "maj_category_map",
    "maj_category_map_available",
    "sub_category_map",
    "sub_category_map_available",
    "tags_map",
    "tags_map_available",
    "disabled_nodes",
    "hidden_names",
    "building_floor_map",
    "building_floor_map_available",
    "building_group_map",
    "whole_maj_map",
    "whole_map",
    "whole_tags_map",
];

impl ContextPatch {
    /// Category map published under `name` (e.g. a `dest_category_map` reference)
    pub fn category_map(&self, name: &str) -> Option<&CategoryMap> {
        match name {
            "maj_category_map" => Some(&self.maj_category_map),
            "maj_category_map_available" => Some(&self.maj_category_map_available),
            "sub_category_map" => Some(&self.sub_category_map),
            "sub_category_map_available" => Some(&self.sub_category_map_available),
            "tags_map" => Some(&self.tags_map),
            "tags_map_available" => Some(&self.tags_map_available),
            "whole_maj_map" => Some(&self.whole_maj_map),
            "whole_map" => Some(&self.whole_map),
            "whole_tags_map" => Some(&self.whole_tags_map),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Context patch failed to serialize");
                Map::new()
            }
        }
    }

    /// Put every field into a dialog context object, replacing earlier values
    pub fn merge_into(&self, context: &mut Map<String, Value>) {
        context.extend(self.to_json());
    }

    /// Request-body form; the info map can be left out to keep payloads small
    pub fn to_request_json(&self, include_info_map: bool) -> Map<String, Value> {
        let mut map = self.to_json();
        if !include_info_map {
            map.remove("info_map");
        }
        map
    }
}

/// Remove every enrichment field from a dialog response context
pub fn strip_context_fields(context: &mut Map<String, Value>) {
    for field in CONTEXT_FIELDS {
        context.remove(*field);
    }
}
