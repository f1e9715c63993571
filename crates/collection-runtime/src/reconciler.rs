//! Embedding surface: owns the content tree, the committed snapshot and the
//! render surface, and runs reconciliation passes through the scheduler.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use collection_core::collections::IndexMap;
use collection_core::{
    diff_with, flatten, Changeset, DiffOptions, Flattened, IndexPath, Item, ReactiveSource,
    SectionNode, Snapshot, SourceId, Subscription, Supplementary,
};

use crate::apply::{apply_reloads, apply_structural, ApplyOutcome};
use crate::error::{ApplyPhase, ReconcileError};
use crate::scheduler::{PassOutcome, SchedulerState, TriggerOutcome};
use crate::surface::{BatchCompletion, RenderSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerOptions {
    /// With nothing committed yet, render the first snapshot with
    /// [`RenderSurface::reset_all`] instead of diffing against empty.
    pub reset_on_empty_baseline: bool,
    pub diff: DiffOptions,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            reset_on_empty_baseline: true,
            diff: DiffOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Passes started, including reset passes.
    pub passes: usize,
    pub resets: usize,
    /// Triggers folded into a follow-up pass.
    pub coalesced_triggers: usize,
    /// Batches issued to the surface.
    pub batches: usize,
    pub failures: usize,
}

type BatchId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Structural,
    Reloads,
}

struct InFlight {
    changeset: Changeset,
    target: Snapshot,
    stage: Stage,
    batch: BatchId,
}

enum Event {
    StartPass,
    BatchCompleted(BatchId),
}

struct ReconcilerInner {
    handle: Weak<ReconcilerInner>,
    content: Vec<SectionNode>,
    options: ReconcilerOptions,
    surface: RefCell<Box<dyn RenderSurface>>,
    state: Cell<SchedulerState>,
    committed: RefCell<Snapshot>,
    /// Set when the surface may no longer match `committed`; the next pass
    /// renders through `reset_all` instead of diffing.
    needs_reset: Cell<bool>,
    in_flight: RefCell<Option<InFlight>>,
    subscriptions: RefCell<IndexMap<SourceId, Subscription>>,
    events: RefCell<VecDeque<Event>>,
    driving: Cell<bool>,
    stats: Cell<ReconcileStats>,
    last_error: RefCell<Option<ReconcileError>>,
    next_batch: Cell<BatchId>,
}

impl ReconcilerInner {
    fn update_stats(&self, f: impl FnOnce(&mut ReconcileStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn trigger(&self) -> Result<(), ReconcileError> {
        let (next, outcome) = self.state.get().on_trigger();
        self.state.set(next);
        match outcome {
            TriggerOutcome::StartPass => self.dispatch(Event::StartPass),
            TriggerOutcome::Coalesced => {
                self.update_stats(|stats| stats.coalesced_triggers += 1);
                log::trace!("trigger coalesced; {} pending", next.pending());
                Ok(())
            }
        }
    }

    /// Queues `event` and drains the queue unless a drain is already running
    /// further up the stack. Returns the first failure of this drain.
    fn dispatch(&self, event: Event) -> Result<(), ReconcileError> {
        self.events.borrow_mut().push_back(event);
        if self.driving.replace(true) {
            return Ok(());
        }
        let mut first_error = None;
        loop {
            let next = self.events.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let result = match event {
                Event::StartPass => self.start_pass(),
                Event::BatchCompleted(batch) => self.on_batch_completed(batch),
            };
            if let Err(err) = result {
                self.fail(&err);
                first_error.get_or_insert(err);
            }
        }
        self.driving.set(false);
        first_error.map_or(Ok(()), Err)
    }

    fn start_pass(&self) -> Result<(), ReconcileError> {
        self.update_stats(|stats| stats.passes += 1);
        let Flattened { snapshot, sources } = flatten(&self.content);
        self.sync_subscriptions(sources);

        let reset = self.needs_reset.take()
            || (self.options.reset_on_empty_baseline && self.committed.borrow().is_empty());
        if reset {
            log::debug!(
                "reset_all with {} section(s), {} item(s)",
                snapshot.len(),
                snapshot.total_items()
            );
            self.surface
                .borrow_mut()
                .reset_all(&snapshot)
                .map_err(|err| ReconcileError::surface(ApplyPhase::Reset, err))?;
            self.update_stats(|stats| stats.resets += 1);
            *self.committed.borrow_mut() = snapshot;
            self.complete_pass();
            return Ok(());
        }

        let changeset = diff_with(&self.committed.borrow(), &snapshot, &self.options.diff);
        if changeset.is_empty() {
            log::trace!("pass produced no changes");
            *self.committed.borrow_mut() = snapshot;
            self.complete_pass();
            return Ok(());
        }
        log::debug!("applying {:?}", changeset.summary());

        let batch = self.next_batch_id();
        let outcome = apply_structural(
            &mut **self.surface.borrow_mut(),
            &changeset,
            &snapshot,
            || self.completion(batch),
        )?;
        // The surface reads from the target from here on.
        *self.committed.borrow_mut() = snapshot.clone();
        let flight = InFlight {
            changeset,
            target: snapshot,
            stage: Stage::Structural,
            batch,
        };
        match outcome {
            ApplyOutcome::Issued => {
                self.update_stats(|stats| stats.batches += 1);
                *self.in_flight.borrow_mut() = Some(flight);
                Ok(())
            }
            ApplyOutcome::Skipped => self.start_reloads(flight),
        }
    }

    fn start_reloads(&self, mut flight: InFlight) -> Result<(), ReconcileError> {
        let batch = self.next_batch_id();
        let outcome = apply_reloads(
            &mut **self.surface.borrow_mut(),
            &flight.changeset,
            &flight.target,
            || self.completion(batch),
        )?;
        match outcome {
            ApplyOutcome::Issued => {
                self.update_stats(|stats| stats.batches += 1);
                flight.stage = Stage::Reloads;
                flight.batch = batch;
                *self.in_flight.borrow_mut() = Some(flight);
            }
            ApplyOutcome::Skipped => self.complete_pass(),
        }
        Ok(())
    }

    fn on_batch_completed(&self, batch: BatchId) -> Result<(), ReconcileError> {
        let flight = {
            let mut in_flight = self.in_flight.borrow_mut();
            match in_flight.as_ref() {
                Some(flight) if flight.batch == batch => in_flight.take(),
                _ => None,
            }
        };
        let Some(flight) = flight else {
            log::debug!("ignoring completion of stale batch {batch}");
            return Ok(());
        };
        match flight.stage {
            Stage::Structural => self.start_reloads(flight),
            Stage::Reloads => {
                self.complete_pass();
                Ok(())
            }
        }
    }

    fn complete_pass(&self) {
        let (next, outcome) = self.state.get().on_pass_complete();
        self.state.set(next);
        match outcome {
            PassOutcome::Settled => log::trace!("reconciler settled"),
            PassOutcome::Rerun { coalesced } => {
                log::debug!("rerunning pass for {coalesced} coalesced trigger(s)");
                self.events.borrow_mut().push_back(Event::StartPass);
            }
        }
    }

    fn fail(&self, err: &ReconcileError) {
        log::error!("collection reconciliation failed: {err}");
        match err.phase() {
            // Reloads run after the structure (and `committed`) moved on, and a
            // failed reset leaves the surface in an unknown state.
            ApplyPhase::Reset | ApplyPhase::Reloads => {
                log::warn!("surface out of sync; next pass resets");
                self.needs_reset.set(true);
            }
            ApplyPhase::Structural => {}
        }
        self.state.set(self.state.get().on_pass_failed());
        self.in_flight.borrow_mut().take();
        self.events.borrow_mut().clear();
        self.update_stats(|stats| stats.failures += 1);
        *self.last_error.borrow_mut() = Some(err.clone());
    }

    fn next_batch_id(&self) -> BatchId {
        let id = self.next_batch.get();
        self.next_batch.set(id + 1);
        id
    }

    fn completion(&self, batch: BatchId) -> BatchCompletion {
        let handle = self.handle.clone();
        BatchCompletion::new(move || {
            if let Some(inner) = handle.upgrade() {
                // Failures are logged and stored by `dispatch`.
                let _ = inner.dispatch(Event::BatchCompleted(batch));
            }
        })
    }

    /// Subscribes to newly reachable sources and drops subscriptions to
    /// sources the last flatten no longer reached.
    fn sync_subscriptions(&self, sources: Vec<Rc<dyn ReactiveSource>>) {
        let mut previous = self.subscriptions.take();
        let mut next = IndexMap::default();
        for source in sources {
            let id = source.source_id();
            let subscription = match previous.shift_remove(&id) {
                Some(existing) => existing,
                None => {
                    log::trace!("subscribing to {id:?}");
                    let handle = self.handle.clone();
                    source.subscribe(Rc::new(move || {
                        if let Some(inner) = handle.upgrade() {
                            let _ = inner.trigger();
                        }
                    }))
                }
            };
            next.insert(id, subscription);
        }
        if !previous.is_empty() {
            log::trace!("dropping {} unreachable source(s)", previous.len());
        }
        *self.subscriptions.borrow_mut() = next;
        // Cancel after the new set is in place; cancelling runs source code.
        drop(previous);
    }
}

/// Keeps a render surface in sync with a declarative collection body.
///
/// Nothing is rendered until the first [`request_reload`]; after that every
/// reactive source reached while flattening triggers a pass on change.
///
/// [`request_reload`]: CollectionReconciler::request_reload
#[derive(Clone)]
pub struct CollectionReconciler {
    inner: Rc<ReconcilerInner>,
}

impl CollectionReconciler {
    pub fn new(
        content: impl IntoIterator<Item = SectionNode>,
        surface: impl RenderSurface + 'static,
    ) -> Self {
        Self::with_options(content, surface, ReconcilerOptions::default())
    }

    pub fn with_options(
        content: impl IntoIterator<Item = SectionNode>,
        surface: impl RenderSurface + 'static,
        options: ReconcilerOptions,
    ) -> Self {
        let content: Vec<SectionNode> = content.into_iter().collect();
        let surface: Box<dyn RenderSurface> = Box::new(surface);
        let inner = Rc::new_cyclic(|handle| ReconcilerInner {
            handle: handle.clone(),
            content,
            options,
            surface: RefCell::new(surface),
            state: Cell::new(SchedulerState::Idle),
            committed: RefCell::new(Snapshot::default()),
            needs_reset: Cell::new(false),
            in_flight: RefCell::new(None),
            subscriptions: RefCell::new(IndexMap::default()),
            events: RefCell::new(VecDeque::new()),
            driving: Cell::new(false),
            stats: Cell::new(ReconcileStats::default()),
            last_error: RefCell::new(None),
            next_batch: Cell::new(1),
        });
        Self { inner }
    }

    pub fn options(&self) -> ReconcilerOptions {
        self.inner.options
    }

    /// Triggers a pass, or folds into the pending one if a pass is running.
    ///
    /// Returns the error of any pass that failed while this call was driving
    /// the scheduler. Passes finished later through a batch completion report
    /// through [`last_error`](Self::last_error) only.
    pub fn request_reload(&self) -> Result<(), ReconcileError> {
        self.inner.trigger()
    }

    /// Makes the next pass render from scratch through `reset_all`, whatever
    /// the options say, and triggers it.
    pub fn force_reset(&self) -> Result<(), ReconcileError> {
        log::debug!("forcing full reset");
        self.inner.needs_reset.set(true);
        self.inner.trigger()
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.get()
    }

    pub fn is_idle(&self) -> bool {
        self.state().is_idle()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.inner.stats.get()
    }

    pub fn last_error(&self) -> Option<ReconcileError> {
        self.inner.last_error.borrow().clone()
    }

    /// Whether the next pass will go through `reset_all`.
    pub fn needs_reset(&self) -> bool {
        self.inner.needs_reset.get()
    }

    pub fn take_last_error(&self) -> Option<ReconcileError> {
        self.inner.last_error.borrow_mut().take()
    }

    /// Sources currently subscribed to, in first-seen order.
    pub fn subscribed_sources(&self) -> Vec<SourceId> {
        self.inner.subscriptions.borrow().keys().copied().collect()
    }

    /// The snapshot the surface currently reads from.
    pub fn committed(&self) -> Snapshot {
        self.inner.committed.borrow().clone()
    }

    pub fn with_committed<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.inner.committed.borrow())
    }

    pub fn number_of_sections(&self) -> usize {
        self.inner.committed.borrow().len()
    }

    pub fn number_of_items(&self, section: usize) -> usize {
        self.inner
            .committed
            .borrow()
            .item_count(section)
            .unwrap_or(0)
    }

    pub fn item(&self, at: IndexPath) -> Option<Item> {
        self.inner.committed.borrow().item(at).cloned()
    }

    pub fn header(&self, section: usize) -> Option<Supplementary> {
        self.inner
            .committed
            .borrow()
            .section(section)
            .and_then(|section| section.header().cloned())
    }

    pub fn footer(&self, section: usize) -> Option<Supplementary> {
        self.inner
            .committed
            .borrow()
            .section(section)
            .and_then(|section| section.footer().cloned())
    }

    pub fn can_drag(&self, at: IndexPath) -> bool {
        self.item(at)
            .and_then(|item| item.drag().map(|drag| drag.can_drag(at)))
            .unwrap_or(false)
    }

    pub fn drag_payload(&self, at: IndexPath) -> Option<String> {
        let item = self.item(at)?;
        let drag = item.drag()?;
        if drag.can_drag(at) {
            drag.drag_payload(at)
        } else {
            None
        }
    }

    pub fn will_display(&self, at: IndexPath) {
        if let Some(item) = self.item(at) {
            if let Some(observer) = item.lifecycle() {
                observer.will_display(at);
            }
        }
    }

    pub fn did_end_display(&self, at: IndexPath) {
        if let Some(item) = self.item(at) {
            if let Some(observer) = item.lifecycle() {
                observer.did_end_display(at);
            }
        }
    }

    pub fn did_select(&self, at: IndexPath) {
        if let Some(item) = self.item(at) {
            if let Some(observer) = item.lifecycle() {
                observer.did_select(at);
            }
        }
    }

    /// Rows without a lifecycle observer highlight by default.
    pub fn should_highlight(&self, at: IndexPath) -> bool {
        match self.item(at) {
            Some(item) => item
                .lifecycle()
                .map_or(true, |observer| observer.should_highlight(at)),
            None => false,
        }
    }
}

impl fmt::Debug for CollectionReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionReconciler")
            .field("state", &self.state())
            .field("sections", &self.number_of_sections())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
