//! Map and hasher aliases shared by the workspace.
//!
//! `hashbrown` + `ahash` back every identity lookup by default. Enabling the
//! `std-hash` feature swaps both for the standard library equivalents, which
//! is handy when comparing behaviour against a plain `std` build.

use std::hash::{BuildHasherDefault, Hash, Hasher};

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};

    pub type DefaultHasher = std::collections::hash_map::DefaultHasher;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};

    pub type DefaultHasher = ahash::AHasher;
}

/// Deterministic hasher builder used for ordered maps.
pub type BuildKeyHasher = BuildHasherDefault<map::DefaultHasher>;

/// Insertion-ordered map keyed with [`BuildKeyHasher`].
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildKeyHasher>;

/// Hash a single value with whichever default hasher is active.
#[inline]
pub fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = map::DefaultHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
