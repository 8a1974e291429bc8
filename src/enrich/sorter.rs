//! Pronunciation-order sorting of published name lists
//!
//! Names with an info entry carrying a `pron` are ordered by that pron,
//! case-insensitively. Every other name keeps its slot, so unresolvable
//! names never move relative to each other.

use crate::context::{BuildingFloorMap, ContextPatch};
use crate::directory::info_map::{CategoryMap, InfoMap};
use indexmap::IndexSet;

pub fn sort_context_patch(patch: &mut ContextPatch) {
    let info_map = &patch.info_map;
    for map in [
        &mut patch.maj_category_map,
        &mut patch.maj_category_map_available,
        &mut patch.sub_category_map,
        &mut patch.sub_category_map_available,
        &mut patch.tags_map,
        &mut patch.tags_map_available,
        &mut patch.whole_map,
        &mut patch.whole_maj_map,
        &mut patch.whole_tags_map,
    ] {
        sort_category_map(map, info_map);
    }
    for floors in [
        patch.building_floor_map.as_mut(),
        patch.building_floor_map_available.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        sort_building_floor_map(floors, info_map);
    }
}

pub fn sort_category_map(map: &mut CategoryMap, info_map: &InfoMap) {
    for names in map.values_mut() {
        sort_names(names, info_map);
    }
}

fn sort_building_floor_map(map: &mut BuildingFloorMap, info_map: &InfoMap) {
    for floors in map.values_mut() {
        for titles in floors.values_mut() {
            sort_names(titles, info_map);
        }
    }
}

/// Stable sort of the resolvable names among their own positions
pub fn sort_names(names: &mut IndexSet<String>, info_map: &InfoMap) {
    let mut ordered: Vec<String> = names.drain(..).collect();

    let (slots, mut keyed): (Vec<usize>, Vec<(String, String)>) = ordered
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let pron = info_map.get(name)?.pron.as_deref()?;
            Some((index, (pron.to_lowercase(), name.clone())))
        })
        .unzip();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    for (slot, (_, name)) in slots.into_iter().zip(keyed) {
        ordered[slot] = name;
    }
    names.extend(ordered);
}
