//! Per-surface cache of measured sizes keyed by reuse kind and identity.
//!
//! Entries are keyed by identity rather than position, so moves never
//! invalidate them. Reloads and mutations do, and entries for identities that
//! left the collection are evicted when a new snapshot is committed.

use collection_core::collections::map::HashSet;
use collection_core::collections::IndexMap;
use collection_core::{Identity, Section, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeKey {
    /// Kind of view measured, e.g. "row" or "header".
    pub reuse: &'static str,
    pub identity: Identity,
}

impl SizeKey {
    pub const fn new(reuse: &'static str, identity: Identity) -> Self {
        Self { reuse, identity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCacheConfig {
    /// Maximum number of entries; least recently used entries go first.
    pub capacity: usize,
}

impl Default for SizeCacheConfig {
    fn default() -> Self {
        Self { capacity: 512 }
    }
}

#[derive(Debug, Default)]
pub struct SizeCache {
    config: SizeCacheConfig,
    entries: IndexMap<SizeKey, Size>,
}

impl SizeCache {
    pub fn new(config: SizeCacheConfig) -> Self {
        Self {
            config,
            entries: IndexMap::default(),
        }
    }

    pub fn config(&self) -> SizeCacheConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a size and marks it most recently used.
    pub fn get(&mut self, key: &SizeKey) -> Option<Size> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, size)| *size)
    }

    pub fn insert(&mut self, key: SizeKey, size: Size) {
        if self.config.capacity == 0 {
            return;
        }
        self.entries.shift_remove(&key);
        while self.entries.len() >= self.config.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, size);
    }

    pub fn get_or_measure(&mut self, key: SizeKey, measure: impl FnOnce() -> Size) -> Size {
        if let Some(size) = self.get(&key) {
            return size;
        }
        let size = measure();
        self.insert(key, size);
        size
    }

    /// Drops every entry for `identity`, whatever its reuse kind.
    pub fn invalidate(&mut self, identity: Identity) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.identity != identity);
        before - self.entries.len()
    }

    /// Evicts entries whose identity no longer appears in `snapshot`.
    pub fn retain_snapshot(&mut self, snapshot: &Snapshot) {
        let live = snapshot_identities(snapshot);
        self.entries.retain(|key, _| live.contains(&key.identity));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn section_identities(section: &Section) -> impl Iterator<Item = Identity> + '_ {
    std::iter::once(section.identity())
        .chain(section.header().map(|header| header.identity()))
        .chain(section.footer().map(|footer| footer.identity()))
        .chain(section.item_identities())
}

fn snapshot_identities(snapshot: &Snapshot) -> HashSet<Identity> {
    snapshot.sections().iter().flat_map(section_identities).collect()
}
