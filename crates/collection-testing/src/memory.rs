//! In-memory [`RenderSurface`] that applies batches the way a real
//! collection view does and logs every operation it accepted.
//!
//! Batches are validated when they close: every section and item count must
//! match the target snapshot afterwards, otherwise the batch is rejected with
//! [`SurfaceError::CountMismatch`] and nothing changes.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use collection_core::{Identity, IndexPath, Item, Section, Snapshot};
use collection_runtime::{
    BatchCompletion, IndexScope, RenderSurface, Size, SizeCache, SizeCacheConfig, SizeKey,
    SurfaceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    BeginBatch,
    EndBatch,
    DeleteSections,
    InsertSections,
    MoveSection,
    ReloadSections,
    DeleteItems,
    InsertItems,
    MoveItem,
    ReloadItems,
    ResetAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    BeginBatch { sections: usize },
    EndBatch,
    DeleteSections(Vec<usize>),
    InsertSections(Vec<usize>),
    MoveSection { from: usize, to: usize },
    ReloadSections(Vec<usize>),
    DeleteItems { section: usize, items: Vec<usize> },
    InsertItems { section: usize, items: Vec<usize> },
    MoveItem { section: usize, from: usize, to: usize },
    ReloadItems { section: usize, items: Vec<usize> },
    ResetAll { sections: usize },
}

impl SurfaceOp {
    pub fn kind(&self) -> OpKind {
        match self {
            SurfaceOp::BeginBatch { .. } => OpKind::BeginBatch,
            SurfaceOp::EndBatch => OpKind::EndBatch,
            SurfaceOp::DeleteSections(_) => OpKind::DeleteSections,
            SurfaceOp::InsertSections(_) => OpKind::InsertSections,
            SurfaceOp::MoveSection { .. } => OpKind::MoveSection,
            SurfaceOp::ReloadSections(_) => OpKind::ReloadSections,
            SurfaceOp::DeleteItems { .. } => OpKind::DeleteItems,
            SurfaceOp::InsertItems { .. } => OpKind::InsertItems,
            SurfaceOp::MoveItem { .. } => OpKind::MoveItem,
            SurfaceOp::ReloadItems { .. } => OpKind::ReloadItems,
            SurfaceOp::ResetAll { .. } => OpKind::ResetAll,
        }
    }
}

/// When the surface calls a batch completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Inside `end_batch`, before it returns.
    #[default]
    Immediate,
    /// Only from [`MemorySurface::complete_next`] or [`MemorySurface::settle`].
    Manual,
}

#[derive(Default)]
struct ItemOps {
    deletes: BTreeSet<usize>,
    inserts: BTreeSet<usize>,
    moves: Vec<(usize, usize)>,
    reloads: BTreeSet<usize>,
}

impl ItemOps {
    fn is_structural(&self) -> bool {
        !self.deletes.is_empty() || !self.inserts.is_empty() || !self.moves.is_empty()
    }
}

struct OpenBatch {
    target: Snapshot,
    deletes: BTreeSet<usize>,
    inserts: BTreeSet<usize>,
    moves: Vec<(usize, usize)>,
    reloads: BTreeSet<usize>,
    items: BTreeMap<usize, ItemOps>,
}

impl OpenBatch {
    fn new(target: Snapshot) -> Self {
        Self {
            target,
            deletes: BTreeSet::new(),
            inserts: BTreeSet::new(),
            moves: Vec::new(),
            reloads: BTreeSet::new(),
            items: BTreeMap::new(),
        }
    }

    fn item_ops(&mut self, section: usize) -> Result<&mut ItemOps, SurfaceError> {
        check_index(IndexScope::Section, section, self.target.len())?;
        Ok(self.items.entry(section).or_default())
    }

    fn target_item_count(&self, section: usize) -> usize {
        self.target.item_count(section).unwrap_or(0)
    }
}

struct SurfaceModel {
    rendered: Vec<Section>,
    batch: Option<OpenBatch>,
    log: Vec<SurfaceOp>,
    completions: VecDeque<BatchCompletion>,
    mode: CompletionMode,
    strict: bool,
    failures: Vec<(OpKind, SurfaceError)>,
    batches_committed: usize,
    size_cache: Option<SizeCache>,
}

impl SurfaceModel {
    fn take_failure(&mut self, kind: OpKind) -> Result<(), SurfaceError> {
        match self.failures.iter().position(|(candidate, _)| *candidate == kind) {
            Some(index) => Err(self.failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn open_batch(&mut self) -> Result<&mut OpenBatch, SurfaceError> {
        self.batch.as_mut().ok_or(SurfaceError::NoOpenBatch)
    }

    fn commit(&mut self, batch: OpenBatch) -> Result<(), SurfaceError> {
        if self.strict {
            check_conflicts(&batch)?;
        }
        let target = &batch.target;

        let mut sections = place(
            self.rendered.clone(),
            IndexScope::Section,
            target.len(),
            &batch.deletes,
            &batch.inserts,
            &batch.moves,
            |index| target.sections()[index].clone(),
        )?;
        apply_item_ops(&mut sections, &batch)?;
        for &index in &batch.reloads {
            sections[index] = target.sections()[index].clone();
        }
        for (&section, ops) in &batch.items {
            let target_items = target.sections()[section].items();
            let items = sections[section].items_mut();
            for &item in &ops.reloads {
                if let (Some(slot), Some(fresh)) = (items.get_mut(item), target_items.get(item)) {
                    *slot = fresh.clone();
                }
            }
        }
        check_counts(&sections, target)?;

        if let Some(cache) = self.size_cache.as_mut() {
            for &index in &batch.reloads {
                for identity in target.sections()[index].item_identities() {
                    cache.invalidate(identity);
                }
            }
            for (&section, ops) in &batch.items {
                for &item in &ops.reloads {
                    cache.invalidate(target.sections()[section].items()[item].identity());
                }
            }
            cache.retain_snapshot(target);
        }

        self.rendered = sections;
        self.batches_committed += 1;
        Ok(())
    }
}

fn check_index(scope: IndexScope, index: usize, len: usize) -> Result<(), SurfaceError> {
    if index < len {
        Ok(())
    } else {
        Err(SurfaceError::IndexOutOfRange { scope, index, len })
    }
}

fn check_conflicts(batch: &OpenBatch) -> Result<(), SurfaceError> {
    for (&section, ops) in &batch.items {
        if batch.reloads.contains(&section) && (ops.is_structural() || !ops.reloads.is_empty()) {
            return Err(SurfaceError::ConflictingOperation(format!(
                "section {section} is reloaded and has item operations in the same batch"
            )));
        }
        if ops.is_structural() && !ops.reloads.is_empty() {
            return Err(SurfaceError::ConflictingOperation(format!(
                "section {section} mixes item reloads with structural item operations"
            )));
        }
    }
    Ok(())
}

fn apply_item_ops(sections: &mut [Section], batch: &OpenBatch) -> Result<(), SurfaceError> {
    for (&index, ops) in &batch.items {
        if !ops.is_structural() {
            continue;
        }
        let scope = IndexScope::Item { section: index };
        let section = sections
            .get_mut(index)
            .ok_or(SurfaceError::IndexOutOfRange {
                scope: IndexScope::Section,
                index,
                len: batch.target.len(),
            })?;
        let target_items = batch.target.sections()[index].items();
        let old_items = std::mem::take(section.items_mut());
        let items = place(
            old_items,
            scope,
            batch.target_item_count(index),
            &ops.deletes,
            &ops.inserts,
            &ops.moves,
            |item| target_items[item].clone(),
        )?;
        *section.items_mut() = items;
    }
    Ok(())
}

fn check_counts(sections: &[Section], target: &Snapshot) -> Result<(), SurfaceError> {
    for (index, (rendered, expected)) in sections.iter().zip(target.sections()).enumerate() {
        if rendered.len() != expected.len() {
            return Err(SurfaceError::CountMismatch {
                scope: IndexScope::Item { section: index },
                expected: expected.len(),
                actual: rendered.len(),
            });
        }
    }
    Ok(())
}

/// Batch-update placement: inserted entries and move targets take their new
/// slots, everything that was neither deleted nor moved fills the remaining
/// slots in its old order.
fn place<T>(
    old: Vec<T>,
    scope: IndexScope,
    new_len: usize,
    deletes: &BTreeSet<usize>,
    inserts: &BTreeSet<usize>,
    moves: &[(usize, usize)],
    fresh: impl Fn(usize) -> T,
) -> Result<Vec<T>, SurfaceError> {
    let old_len = old.len();
    let mut sources: BTreeSet<usize> = BTreeSet::new();
    let mut targets: BTreeSet<usize> = inserts.clone();
    for &index in deletes {
        check_index(scope, index, old_len)?;
    }
    for &index in inserts {
        check_index(scope, index, new_len)?;
    }
    for &(from, to) in moves {
        check_index(scope, from, old_len)?;
        check_index(scope, to, new_len)?;
        if deletes.contains(&from) || !sources.insert(from) {
            return Err(SurfaceError::ConflictingOperation(format!(
                "{scope} {from} is moved twice or moved after deletion"
            )));
        }
        if !targets.insert(to) {
            return Err(SurfaceError::ConflictingOperation(format!(
                "{scope} slot {to} is filled twice"
            )));
        }
    }

    let remaining = old_len - deletes.len() - sources.len();
    if remaining + targets.len() != new_len {
        return Err(SurfaceError::CountMismatch {
            scope,
            expected: new_len,
            actual: remaining + targets.len(),
        });
    }

    let mut old: Vec<Option<T>> = old.into_iter().map(Some).collect();
    let mut slots: Vec<Option<T>> = (0..new_len).map(|_| None).collect();
    for &index in inserts {
        slots[index] = Some(fresh(index));
    }
    for &(from, to) in moves {
        slots[to] = old[from].take();
    }
    let mut stationary = old
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !deletes.contains(index))
        .filter_map(|(_, entry)| entry);
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        *slot = stationary.next();
    }
    slots
        .into_iter()
        .collect::<Option<Vec<T>>>()
        .ok_or(SurfaceError::CountMismatch {
            scope,
            expected: new_len,
            actual: remaining + targets.len(),
        })
}

/// Shared handle to an in-memory collection view. Clones observe the same
/// state, so a test can keep one while the reconciler owns another.
#[derive(Clone)]
pub struct MemorySurface {
    model: Rc<RefCell<SurfaceModel>>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            model: Rc::new(RefCell::new(SurfaceModel {
                rendered: Vec::new(),
                batch: None,
                log: Vec::new(),
                completions: VecDeque::new(),
                mode: CompletionMode::Immediate,
                strict: true,
                failures: Vec::new(),
                batches_committed: 0,
                size_cache: None,
            })),
        }
    }

    pub fn manual() -> Self {
        let surface = Self::new();
        surface.set_completion_mode(CompletionMode::Manual);
        surface
    }

    /// A surface that already renders `snapshot`, without logging a reset.
    pub fn showing(snapshot: &Snapshot) -> Self {
        let surface = Self::new();
        surface.model.borrow_mut().rendered = snapshot.sections().to_vec();
        surface
    }

    pub fn with_size_cache(self, config: SizeCacheConfig) -> Self {
        self.model.borrow_mut().size_cache = Some(SizeCache::new(config));
        self
    }

    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.model.borrow_mut().mode = mode;
    }

    /// Strict surfaces reject reloads mixed with structural changes of the
    /// same section inside one batch. On by default.
    pub fn set_strict(&self, strict: bool) {
        self.model.borrow_mut().strict = strict;
    }

    /// Makes the next operation of `kind` fail with `error`.
    pub fn inject_failure(&self, kind: OpKind, error: SurfaceError) {
        self.model.borrow_mut().failures.push((kind, error));
    }

    pub fn rendered(&self) -> Snapshot {
        Snapshot::new(self.model.borrow().rendered.clone())
    }

    pub fn section_identities(&self) -> Vec<Identity> {
        self.model
            .borrow()
            .rendered
            .iter()
            .map(Section::identity)
            .collect()
    }

    pub fn item_identities(&self, section: usize) -> Vec<Identity> {
        self.model
            .borrow()
            .rendered
            .get(section)
            .map(|section| section.item_identities().collect())
            .unwrap_or_default()
    }

    /// Whether the rendered state equals `snapshot` in order, identity and
    /// content.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        self.rendered().content_eq(snapshot)
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.model.borrow().log.clone()
    }

    pub fn take_ops(&self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.model.borrow_mut().log)
    }

    pub fn count(&self, kind: OpKind) -> usize {
        self.model
            .borrow()
            .log
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    }

    pub fn batches_committed(&self) -> usize {
        self.model.borrow().batches_committed
    }

    pub fn is_batch_open(&self) -> bool {
        self.model.borrow().batch.is_some()
    }

    pub fn pending_completions(&self) -> usize {
        self.model.borrow().completions.len()
    }

    /// Calls the oldest held completion. Returns `false` if none was held.
    pub fn complete_next(&self) -> bool {
        let completion = self.model.borrow_mut().completions.pop_front();
        match completion {
            Some(completion) => {
                completion.complete();
                true
            }
            None => false,
        }
    }

    /// Completes held batches until none are left, including batches opened
    /// by the completions themselves. Returns how many were completed.
    pub fn settle(&self) -> usize {
        let mut completed = 0;
        while self.complete_next() {
            completed += 1;
        }
        completed
    }

    /// Size of the rendered item at `at`, measured through the size cache.
    pub fn measure(
        &self,
        at: IndexPath,
        reuse: &'static str,
        measure: impl FnOnce(&Item) -> Size,
    ) -> Option<Size> {
        let mut model = self.model.borrow_mut();
        let item = model.rendered.get(at.section)?.item(at.item)?.clone();
        let key = SizeKey::new(reuse, item.identity());
        match model.size_cache.as_mut() {
            Some(cache) => Some(cache.get_or_measure(key, || measure(&item))),
            None => Some(measure(&item)),
        }
    }

    pub fn cached_sizes(&self) -> usize {
        self.model
            .borrow()
            .size_cache
            .as_ref()
            .map_or(0, SizeCache::len)
    }

    fn record_batch_op(
        &mut self,
        op: SurfaceOp,
        apply: impl FnOnce(&mut OpenBatch) -> Result<(), SurfaceError>,
    ) -> Result<(), SurfaceError> {
        let mut model = self.model.borrow_mut();
        model.take_failure(op.kind())?;
        let rendered_len = model.rendered.len();
        let batch = model.open_batch()?;
        if let SurfaceOp::DeleteSections(deleted) = &op {
            for &index in deleted {
                check_index(IndexScope::Section, index, rendered_len)?;
            }
        }
        apply(batch)?;
        log::trace!("memory surface: {op:?}");
        model.log.push(op);
        Ok(())
    }
}

fn indices(set: &BTreeSet<usize>) -> Vec<usize> {
    set.iter().copied().collect()
}

impl RenderSurface for MemorySurface {
    fn begin_batch(&mut self, target: &Snapshot) -> Result<(), SurfaceError> {
        let mut model = self.model.borrow_mut();
        model.take_failure(OpKind::BeginBatch)?;
        if model.batch.is_some() {
            return Err(SurfaceError::BatchAlreadyOpen);
        }
        model.batch = Some(OpenBatch::new(target.clone()));
        model.log.push(SurfaceOp::BeginBatch {
            sections: target.len(),
        });
        Ok(())
    }

    fn end_batch(&mut self, completion: BatchCompletion) -> Result<(), SurfaceError> {
        let inline = {
            let mut model = self.model.borrow_mut();
            if let Err(err) = model.take_failure(OpKind::EndBatch) {
                model.batch = None;
                completion.cancel();
                return Err(err);
            }
            let Some(batch) = model.batch.take() else {
                completion.cancel();
                return Err(SurfaceError::NoOpenBatch);
            };
            if let Err(err) = model.commit(batch) {
                completion.cancel();
                return Err(err);
            }
            model.log.push(SurfaceOp::EndBatch);
            match model.mode {
                CompletionMode::Immediate => Some(completion),
                CompletionMode::Manual if completion.is_detached() => None,
                CompletionMode::Manual => {
                    model.completions.push_back(completion);
                    None
                }
            }
        };
        // Completions may start the next batch on this very surface.
        if let Some(completion) = inline {
            completion.complete();
        }
        Ok(())
    }

    fn delete_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record_batch_op(SurfaceOp::DeleteSections(indices(sections)), |batch| {
            batch.deletes.extend(sections.iter().copied());
            Ok(())
        })
    }

    fn insert_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record_batch_op(SurfaceOp::InsertSections(indices(sections)), |batch| {
            for &index in sections {
                check_index(IndexScope::Section, index, batch.target.len())?;
            }
            batch.inserts.extend(sections.iter().copied());
            Ok(())
        })
    }

    fn move_section(&mut self, from: usize, to: usize) -> Result<(), SurfaceError> {
        self.record_batch_op(SurfaceOp::MoveSection { from, to }, |batch| {
            check_index(IndexScope::Section, to, batch.target.len())?;
            batch.moves.push((from, to));
            Ok(())
        })
    }

    fn reload_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record_batch_op(SurfaceOp::ReloadSections(indices(sections)), |batch| {
            for &index in sections {
                check_index(IndexScope::Section, index, batch.target.len())?;
            }
            batch.reloads.extend(sections.iter().copied());
            Ok(())
        })
    }

    fn delete_items(&mut self, section: usize, items: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        let op = SurfaceOp::DeleteItems {
            section,
            items: indices(items),
        };
        self.record_batch_op(op, |batch| {
            batch.item_ops(section)?.deletes.extend(items.iter().copied());
            Ok(())
        })
    }

    fn insert_items(&mut self, section: usize, items: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        let op = SurfaceOp::InsertItems {
            section,
            items: indices(items),
        };
        self.record_batch_op(op, |batch| {
            let len = batch.target_item_count(section);
            for &item in items {
                check_index(IndexScope::Item { section }, item, len)?;
            }
            batch.item_ops(section)?.inserts.extend(items.iter().copied());
            Ok(())
        })
    }

    fn move_item(&mut self, section: usize, from: usize, to: usize) -> Result<(), SurfaceError> {
        self.record_batch_op(SurfaceOp::MoveItem { section, from, to }, |batch| {
            let len = batch.target_item_count(section);
            check_index(IndexScope::Item { section }, to, len)?;
            batch.item_ops(section)?.moves.push((from, to));
            Ok(())
        })
    }

    fn reload_items(&mut self, section: usize, items: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        let op = SurfaceOp::ReloadItems {
            section,
            items: indices(items),
        };
        self.record_batch_op(op, |batch| {
            let len = batch.target_item_count(section);
            for &item in items {
                check_index(IndexScope::Item { section }, item, len)?;
            }
            batch.item_ops(section)?.reloads.extend(items.iter().copied());
            Ok(())
        })
    }

    fn reset_all(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError> {
        let mut model = self.model.borrow_mut();
        model.take_failure(OpKind::ResetAll)?;
        if model.batch.is_some() {
            return Err(SurfaceError::BatchAlreadyOpen);
        }
        model.rendered = snapshot.sections().to_vec();
        if let Some(cache) = model.size_cache.as_mut() {
            cache.retain_snapshot(snapshot);
        }
        model.log.push(SurfaceOp::ResetAll {
            sections: snapshot.len(),
        });
        Ok(())
    }
}
