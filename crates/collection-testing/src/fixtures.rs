//! Small builders for snapshots used across the test suites.

use collection_core::{diff, Identity, Item, Keyed, Section, Snapshot, Supplementary};
use collection_runtime::{apply_reloads, apply_structural, BatchCompletion, ReconcileError};

use crate::memory::MemorySurface;

pub fn row(key: &str) -> Item {
    Item::new(Keyed::new(key, 0u32))
}

/// Row whose content compares `value`, so a new value under the same key is a mutation.
pub fn row_with(key: &str, value: u32) -> Item {
    Item::new(Keyed::new(key, value))
}

pub fn label(key: &str, text: &str) -> Supplementary {
    Supplementary::new(Keyed::new(key, text.to_string()))
}

pub fn section(key: &str, rows: &[&str]) -> Section {
    Section::new(Identity::of(key)).with_items(rows.iter().map(|key| row(key)))
}

pub fn snapshot(sections: &[(&str, &[&str])]) -> Snapshot {
    sections
        .iter()
        .map(|(key, rows)| section(key, rows))
        .collect()
}

/// Applies `diff(previous, current)` to `surface` with both batches issued
/// back to back. Only meaningful for surfaces completing immediately.
pub fn apply_diff(
    surface: &mut MemorySurface,
    previous: &Snapshot,
    current: &Snapshot,
) -> Result<(), ReconcileError> {
    let changeset = diff(previous, current);
    apply_structural(surface, &changeset, current, BatchCompletion::detached)?;
    apply_reloads(surface, &changeset, current, BatchCompletion::detached)?;
    Ok(())
}
