//! Request-time derivation over the cached info maps

pub mod disabled;
pub mod dynamic;
pub mod sorter;

pub use disabled::{DisabledNodeCache, DisabledNodeSet};
pub use dynamic::{build_context_patch, filter_names, DynamicInputs, DEFAULT_USER_MODE};
pub use sorter::sort_context_patch;
