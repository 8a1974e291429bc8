//! Directory snapshot, its tree model and the per-language info maps built from it

pub mod cache;
pub mod dictionary;
pub mod info_map;
pub mod tree;

pub use cache::{DirectoryCache, EpochSnapshot};
pub use dictionary::{NameDictionaries, NameDictionary, CATEGORY_PREFIX};
pub use info_map::{
    build_category_map, build_info_maps, AliasMap, CategoryMap, InfoEntry, InfoMap, InfoMaps,
};
pub use tree::{DirectorySnapshot, DirectoryTree, FacilityLeaf, LanguageDirectory};
