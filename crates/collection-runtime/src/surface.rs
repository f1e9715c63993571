//! The stateful render surface a collection is reconciled against.
//!
//! A surface keeps its own rendered copy of the collection and only learns
//! about changes through the primitive operations below. Operations between
//! [`RenderSurface::begin_batch`] and [`RenderSurface::end_batch`] form one
//! batch with batch-update index semantics: deletions and move sources refer
//! to the state before the batch, insertions, move targets and reloads to the
//! target snapshot passed to `begin_batch`.

use std::collections::BTreeSet;
use std::fmt;

use collection_core::Snapshot;

use crate::error::SurfaceError;

pub trait RenderSurface {
    /// Opens a batch. `target` is the data source the surface reads new
    /// content from until the batch closes.
    fn begin_batch(&mut self, target: &Snapshot) -> Result<(), SurfaceError>;

    /// Closes the open batch. The surface calls `completion` once the
    /// batch has been fully applied, either before returning or later from
    /// its own event loop.
    fn end_batch(&mut self, completion: BatchCompletion) -> Result<(), SurfaceError>;

    fn delete_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError>;

    fn insert_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError>;

    fn move_section(&mut self, from: usize, to: usize) -> Result<(), SurfaceError>;

    fn reload_sections(&mut self, sections: &BTreeSet<usize>) -> Result<(), SurfaceError>;

    /// `items` are positions before the batch, but `section` is the section's
    /// index in the target snapshot, like every other item-level call. A
    /// surface that addresses deletions by old index path has to map
    /// `section` back through the section moves and inserts of the batch.
    fn delete_items(&mut self, section: usize, items: &BTreeSet<usize>)
        -> Result<(), SurfaceError>;

    fn insert_items(&mut self, section: usize, items: &BTreeSet<usize>)
        -> Result<(), SurfaceError>;

    /// `from` is the position before the batch and `to` the position in the
    /// target snapshot. `section` is always the target index, as for
    /// [`delete_items`](Self::delete_items).
    fn move_item(&mut self, section: usize, from: usize, to: usize) -> Result<(), SurfaceError>;

    fn reload_items(&mut self, section: usize, items: &BTreeSet<usize>)
        -> Result<(), SurfaceError>;

    /// Drops all rendered state and renders `snapshot` from scratch, outside
    /// of any batch.
    fn reset_all(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError>;
}

/// One-shot callback handed to [`RenderSurface::end_batch`].
#[must_use = "the reconciler waits until the batch completion is called"]
pub struct BatchCompletion {
    callback: Option<Box<dyn FnOnce()>>,
}

impl BatchCompletion {
    pub fn new(callback: impl FnOnce() + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A completion nobody waits for.
    pub fn detached() -> Self {
        Self { callback: None }
    }

    pub fn is_detached(&self) -> bool {
        self.callback.is_none()
    }

    pub fn complete(mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }

    /// Drops the completion without calling it. Used by surfaces that
    /// rejected the batch and reported an error instead.
    pub fn cancel(mut self) {
        self.callback = None;
    }
}

impl Drop for BatchCompletion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            log::warn!("batch completion dropped without being called; reconciler stays busy");
        }
    }
}

impl fmt::Debug for BatchCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCompletion")
            .field("detached", &self.is_detached())
            .finish()
    }
}
