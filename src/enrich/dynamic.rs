//! Per-request derived maps
//!
//! Layered on the cached [`InfoMaps`]: tag maps, disabled and hidden names,
//! user-mode filtering, building/floor maps and building-group merging. The
//! output is request-local; nothing here touches shared state.

use super::disabled::{disabled_names, DisabledNodeSet};
use crate::context::{BuildingFloorMap, BuildingGroupMap, BuildingMaps, ContextPatch};
use crate::directory::dictionary::{NameDictionary, CATEGORY_PREFIX};
use crate::directory::info_map::{build_category_map, AliasMap, CategoryMap, InfoMap, InfoMaps};
use crate::directory::tree::{BuildingCategories, BuildingFloorSource, LanguageDirectory};
use crate::remote_config::BuildingGroupConfig;
use indexmap::IndexSet;

/// User mode assumed when the caller does not send one
pub const DEFAULT_USER_MODE: &str = "user_general";

/// Names removed from a map
pub type NameSet = IndexSet<String>;

/// Everything one request's derivation reads
pub struct DynamicInputs<'a> {
    pub directory: &'a LanguageDirectory,
    pub info_maps: &'a InfoMaps,
    /// Alias map used for tag expansion; normally `info_maps.alias_map`
    pub alias_map: &'a AliasMap,
    pub names: &'a NameDictionary,
    pub tag_names: &'a NameDictionary,
    pub remote_hidden_names: &'a [String],
    pub building_groups: &'a BuildingGroupConfig,
    /// `None` while the disabled-node set has never been fetched
    pub disabled_nodes: Option<&'a DisabledNodeSet>,
    pub user_mode: &'a str,
}

/// A map with hidden names removed, and its available twin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredMap {
    pub visible: CategoryMap,
    pub available: CategoryMap,
}

pub fn build_context_patch(inputs: &DynamicInputs<'_>) -> ContextPatch {
    let info_map = &inputs.info_maps.info_map;
    let empty_nodes = DisabledNodeSet::new();
    let disabled_nodes = inputs.disabled_nodes.unwrap_or(&empty_nodes);

    let tags_map = build_category_map(
        inputs.directory.tags.as_ref(),
        inputs.alias_map,
        inputs.tag_names,
        "",
    );
    let disabled: NameSet = disabled_names(info_map, disabled_nodes).into_iter().collect();
    let hidden = hidden_names(inputs.remote_hidden_names, info_map, inputs.user_mode);

    let maj = filter_names(&inputs.info_maps.maj_category_map, &disabled, &hidden);
    let sub = filter_names(&inputs.info_maps.sub_category_map, &disabled, &hidden);
    let tags = filter_names(&tags_map, &disabled, &hidden);

    let (building_floor_map, building_floor_map_available) =
        match inputs.directory.building_floors.as_ref() {
            Some(source) => {
                let (any, available) = build_building_floor_maps(source, &hidden, disabled_nodes);
                (Some(any), Some(available))
            }
            None => (None, None),
        };

    let building_group_map = match inputs.directory.building_group.as_ref() {
        Some(buildings) if inputs.building_groups.is_configured() => {
            let per_building = buildings
                .iter()
                .map(|(building, categories)| {
                    (
                        building.clone(),
                        build_building_maps(categories, inputs, &disabled, &hidden),
                    )
                })
                .collect();
            Some(merge_building_groups(per_building, inputs.building_groups))
        }
        _ => None,
    };

    ContextPatch {
        info_map: info_map.clone(),
        alias_map: inputs.alias_map.clone(),
        whole_maj_map: maj.available.clone(),
        whole_map: sub.available.clone(),
        whole_tags_map: tags.available.clone(),
        maj_category_map: maj.visible,
        maj_category_map_available: maj.available,
        sub_category_map: sub.visible,
        sub_category_map_available: sub.available,
        tags_map: tags.visible,
        tags_map_available: tags.available,
        disabled_nodes: disabled.into_iter().collect(),
        hidden_names: hidden.into_iter().collect(),
        building_floor_map,
        building_floor_map_available,
        building_group_map,
    }
}

/// Remote hidden list plus every name explicitly inaccessible to `user_mode`
pub fn hidden_names(remote: &[String], info_map: &InfoMap, user_mode: &str) -> NameSet {
    let mut hidden: NameSet = remote.iter().cloned().collect();
    hidden.extend(
        info_map
            .values()
            .filter(|entry| !entry.accessible_to(user_mode))
            .map(|entry| entry.name.clone()),
    );
    hidden
}

/// Remove hidden names, then (on a separate copy) disabled names
///
/// The visible map keeps every key; the available map drops keys left empty.
pub fn filter_names(map: &CategoryMap, disabled: &NameSet, hidden: &NameSet) -> FilteredMap {
    let mut filtered = FilteredMap::default();
    for (key, names) in map {
        let visible: IndexSet<String> = names
            .iter()
            .filter(|name| !hidden.contains(*name))
            .cloned()
            .collect();
        let available: IndexSet<String> = visible
            .iter()
            .filter(|name| !disabled.contains(*name))
            .cloned()
            .collect();
        if !available.is_empty() {
            filtered.available.insert(key.clone(), available);
        }
        filtered.visible.insert(key.clone(), visible);
    }
    filtered
}

/// Building/floor map and its available twin; hidden titles are skipped outright
pub fn build_building_floor_maps(
    source: &BuildingFloorSource,
    hidden: &NameSet,
    disabled_nodes: &DisabledNodeSet,
) -> (BuildingFloorMap, BuildingFloorMap) {
    let mut any = BuildingFloorMap::new();
    let mut available = BuildingFloorMap::new();

    for (building, floors) in source {
        for (floor, facilities) in floors {
            for facility in facilities {
                if hidden.contains(&facility.title) {
                    continue;
                }
                put_title(&mut any, building, floor, &facility.title);
                if !disabled_nodes.contains(&facility.node) {
                    put_title(&mut available, building, floor, &facility.title);
                }
            }
        }
    }
    (any, available)
}

fn put_title(map: &mut BuildingFloorMap, building: &str, floor: &str, title: &str) {
    map.entry(building.to_string())
        .or_default()
        .entry(floor.to_string())
        .or_default()
        .insert(title.to_string());
}

fn build_building_maps(
    categories: &BuildingCategories,
    inputs: &DynamicInputs<'_>,
    disabled: &NameSet,
    hidden: &NameSet,
) -> BuildingMaps {
    let maj = filter_names(
        &build_category_map(
            categories.major_categories.as_ref(),
            inputs.alias_map,
            inputs.names,
            CATEGORY_PREFIX,
        ),
        disabled,
        hidden,
    );
    let sub = filter_names(
        &build_category_map(
            categories.sub_categories.as_ref(),
            inputs.alias_map,
            inputs.names,
            CATEGORY_PREFIX,
        ),
        disabled,
        hidden,
    );
    let tags = filter_names(
        &build_category_map(
            categories.tags.as_ref(),
            inputs.alias_map,
            inputs.tag_names,
            "",
        ),
        disabled,
        hidden,
    );

    BuildingMaps {
        maj_category_map: maj.visible,
        maj_category_map_available: maj.available,
        sub_category_map: sub.visible,
        sub_category_map_available: sub.available,
        tags_map: tags.visible,
        tags_map_available: tags.available,
    }
}

/// Union member buildings into each configured group, in configuration order
///
/// Groups are inserted as they are built, so a later group may list an earlier
/// one. Groups in the disable list are removed last.
pub fn merge_building_groups(
    mut buildings: BuildingGroupMap,
    config: &BuildingGroupConfig,
) -> BuildingGroupMap {
    for (group, members) in &config.groups {
        buildings.insert(group.clone(), BuildingMaps::default());
        let mut merged = BuildingMaps::default();
        for member in members {
            if let Some(from) = buildings.get(member) {
                merged.union_with(from);
            }
        }
        buildings.insert(group.clone(), merged);
    }
    for group in &config.disabled {
        buildings.shift_remove(group);
    }
    buildings
}
