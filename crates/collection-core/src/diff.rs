//! Two-level snapshot diff.
//!
//! Sections are matched by identity first, then every matched section is
//! diffed item by item. A section whose header or footer changed is reloaded
//! whole and only keeps the structural part of its item diff. Moves are minimised by
//! keeping the longest increasing subsequence of matched old indices (taken in
//! new order) in place and moving everything else.
//!
//! Index conventions follow batch-update semantics: removals and move
//! sources are indices into the previous snapshot, inserts, move targets,
//! `mutated` and `reloads` are indices into the current snapshot. Item-level
//! changes are keyed by the section's index in the current snapshot.

use std::collections::{BTreeMap, BTreeSet};

use crate::collections::map::HashMap;
use crate::identity::Identity;
use crate::model::{Item, Section, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

impl Move {
    #[inline]
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

/// Structural changes for one level (sections, or the items of one section).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChanges {
    pub removals: BTreeSet<usize>,
    pub inserts: BTreeSet<usize>,
    pub moves: Vec<Move>,
    /// Matched entries whose content differs.
    pub mutated: BTreeSet<usize>,
    /// Positions reloaded in place. At item level these come from the
    /// tie-break rule, at section level from a changed header or footer.
    pub reloads: BTreeSet<usize>,
}

impl IndexChanges {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
            && self.inserts.is_empty()
            && self.moves.is_empty()
            && self.mutated.is_empty()
            && self.reloads.is_empty()
    }

    pub fn has_structural_changes(&self) -> bool {
        !self.removals.is_empty() || !self.inserts.is_empty() || !self.moves.is_empty()
    }

    /// Positions that need their content refreshed after the structural step.
    pub fn reload_targets(&self) -> BTreeSet<usize> {
        self.reloads.union(&self.mutated).copied().collect()
    }
}

/// Result of [`diff`]. Pure data, holds no reference to either snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub sections: IndexChanges,
    /// Item-level changes keyed by section index in the current snapshot.
    /// Only sections with at least one change appear.
    pub items: BTreeMap<usize, IndexChanges>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.items.values().all(IndexChanges::is_empty)
    }

    pub fn has_structural_changes(&self) -> bool {
        self.sections.has_structural_changes()
            || self.items.values().any(IndexChanges::has_structural_changes)
    }

    pub fn has_reloads(&self) -> bool {
        !self.sections.reloads.is_empty()
            || self
                .items
                .values()
                .any(|changes| !changes.reloads.is_empty() || !changes.mutated.is_empty())
    }

    pub fn summary(&self) -> ChangesetSummary {
        let mut summary = ChangesetSummary {
            section_removals: self.sections.removals.len(),
            section_inserts: self.sections.inserts.len(),
            section_moves: self.sections.moves.len(),
            section_reloads: self.sections.reloads.len(),
            ..ChangesetSummary::default()
        };
        for changes in self.items.values() {
            summary.item_removals += changes.removals.len();
            summary.item_inserts += changes.inserts.len();
            summary.item_moves += changes.moves.len();
            summary.item_reloads += changes.reload_targets().len();
        }
        summary
    }
}

/// Operation counts, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangesetSummary {
    pub section_removals: usize,
    pub section_inserts: usize,
    pub section_moves: usize,
    pub section_reloads: usize,
    pub item_removals: usize,
    pub item_inserts: usize,
    pub item_moves: usize,
    pub item_reloads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Report an equal set of removed and inserted item positions as an
    /// in-place reload instead of delete + insert.
    pub tie_break_reloads: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tie_break_reloads: true,
        }
    }
}

pub fn diff(previous: &Snapshot, current: &Snapshot) -> Changeset {
    diff_with(previous, current, &DiffOptions::default())
}

pub fn diff_with(previous: &Snapshot, current: &Snapshot, options: &DiffOptions) -> Changeset {
    let old_sections = previous.sections();
    let new_sections = current.sections();
    let old_ids: Vec<Identity> = previous.section_identities().collect();
    let new_ids: Vec<Identity> = current.section_identities().collect();
    let matching = match_identities(&old_ids, &new_ids, "section");

    let mut changeset = Changeset {
        sections: IndexChanges {
            moves: minimal_moves(&matching.pairs, &BTreeSet::new()),
            removals: matching.removals,
            inserts: matching.inserts,
            ..IndexChanges::default()
        },
        items: BTreeMap::new(),
    };

    for &(old_index, new_index) in &matching.pairs {
        let old = &old_sections[old_index];
        let new = &new_sections[new_index];
        let supplementaries_changed = !old.supplementaries_eq(new);
        let sequence_changed = !old.same_item_sequence(new);
        if supplementaries_changed || sequence_changed {
            changeset.sections.mutated.insert(new_index);
        }
        let mut items = if sequence_changed {
            diff_items(old.items(), new.items(), options)
        } else {
            content_changes(old, new)
        };
        if supplementaries_changed {
            // The section reload refreshes item content; only the structure
            // has to go through the structural batch.
            changeset.sections.reloads.insert(new_index);
            items.mutated.clear();
            items.reloads.clear();
        }
        if !items.is_empty() {
            changeset.items.insert(new_index, items);
        }
    }

    changeset
}

/// Item diff for one matched section.
pub fn diff_items(old: &[Item], new: &[Item], options: &DiffOptions) -> IndexChanges {
    let old_ids: Vec<Identity> = old.iter().map(Item::identity).collect();
    let new_ids: Vec<Identity> = new.iter().map(Item::identity).collect();
    let Matching {
        removals,
        inserts,
        mut pairs,
    } = match_identities(&old_ids, &new_ids, "item");

    let mutated = pairs
        .iter()
        .filter(|&&(old_index, new_index)| !new[new_index].content_eq(&old[old_index]))
        .map(|&(_, new_index)| new_index)
        .collect();

    let mut changes = IndexChanges {
        mutated,
        ..IndexChanges::default()
    };

    if options.tie_break_reloads && !removals.is_empty() && removals == inserts {
        // Same slots vanished and appeared: reload them in place. The slots
        // join move minimisation as pinned pairs so they stay put.
        pairs.extend(removals.iter().map(|&position| (position, position)));
        pairs.sort_unstable_by_key(|&(_, new_index)| new_index);
        changes.moves = minimal_moves(&pairs, &removals);
        changes.reloads = removals;
    } else {
        changes.moves = minimal_moves(&pairs, &BTreeSet::new());
        changes.removals = removals;
        changes.inserts = inserts;
    }
    changes
}

/// Fast path when both sections list the same identities in the same order.
fn content_changes(old: &Section, new: &Section) -> IndexChanges {
    let mutated = old
        .items()
        .iter()
        .zip(new.items())
        .enumerate()
        .filter(|(_, (old, new))| !new.content_eq(old))
        .map(|(index, _)| index)
        .collect();
    IndexChanges {
        mutated,
        ..IndexChanges::default()
    }
}

struct Matching {
    removals: BTreeSet<usize>,
    inserts: BTreeSet<usize>,
    /// `(old, new)` pairs ordered by new index.
    pairs: Vec<(usize, usize)>,
}

/// Matches two identity lists. Duplicate identities resolve last-wins: only
/// the last occurrence participates, earlier ones count as removed on the old
/// side and inserted on the new side.
fn match_identities(old: &[Identity], new: &[Identity], level: &str) -> Matching {
    let old_index = index_of(old);
    let new_index = index_of(new);
    if old_index.len() != old.len() || new_index.len() != new.len() {
        log::warn!(
            "duplicate {level} identities (previous: {}, current: {}); resolving last-wins",
            old.len() - old_index.len(),
            new.len() - new_index.len()
        );
    }

    let removals = old
        .iter()
        .enumerate()
        .filter(|&(index, id)| old_index[id] != index || !new_index.contains_key(id))
        .map(|(index, _)| index)
        .collect();

    let mut inserts = BTreeSet::new();
    let mut pairs = Vec::with_capacity(new.len().min(old.len()));
    for (index, id) in new.iter().enumerate() {
        match old_index.get(id) {
            Some(&old_position) if new_index[id] == index => pairs.push((old_position, index)),
            _ => {
                inserts.insert(index);
            }
        }
    }

    Matching {
        removals,
        inserts,
        pairs,
    }
}

fn index_of(ids: &[Identity]) -> HashMap<Identity, usize> {
    let mut map = HashMap::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        map.insert(*id, index);
    }
    map
}

/// Moves for every pair outside the longest increasing run of old indices.
///
/// `pinned` lists new indices of `(p, p)` pairs that must stay put. They are
/// always part of the run; the other pairs only compete for it when their old
/// index fits between the neighbouring pins.
fn minimal_moves(pairs: &[(usize, usize)], pinned: &BTreeSet<usize>) -> Vec<Move> {
    let mut upper = vec![None; pairs.len()];
    let mut next_pin = None;
    for (position, &(old, new)) in pairs.iter().enumerate().rev() {
        upper[position] = next_pin;
        if pinned.contains(&new) {
            next_pin = Some(old);
        }
    }

    let mut stable = vec![false; pairs.len()];
    let mut candidates = Vec::new();
    let mut lower = None;
    for (position, &(old, new)) in pairs.iter().enumerate() {
        if pinned.contains(&new) {
            stable[position] = true;
            lower = Some(old);
        } else if lower.map_or(true, |pin| old > pin)
            && upper[position].map_or(true, |pin| old < pin)
        {
            candidates.push(position);
        }
    }
    let old_order: Vec<usize> = candidates.iter().map(|&position| pairs[position].0).collect();
    for index in longest_increasing_subsequence(&old_order) {
        stable[candidates[index]] = true;
    }

    pairs
        .iter()
        .zip(stable)
        .filter(|&(_, stays)| !stays)
        .map(|(&(from, to), _)| Move::new(from, to))
        .collect()
}

/// Positions (ascending) of one longest strictly increasing subsequence.
///
/// Patience sorting with predecessor links, O(n log n).
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // tails[k] = position of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessors: Vec<Option<usize>> = vec![None; values.len()];

    for (position, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&tail| values[tail] < value);
        if slot > 0 {
            predecessors[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        result.push(position);
        cursor = predecessors[position];
    }
    result.reverse();
    result
}

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod tests;
