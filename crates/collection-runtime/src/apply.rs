//! Translates a [`Changeset`] into ordered surface calls.
//!
//! A changeset is applied in at most two batches. The structural batch
//! carries section deletes, inserts and moves followed by item deletes,
//! inserts and moves per section in ascending section order. Reloads and
//! content mutations go into a second batch that is only opened once the
//! structural batch has completed, so the surface never sees a reload mixed
//! with structural changes of the same batch.

use collection_core::{Changeset, Snapshot};

use crate::error::{ApplyPhase, ReconcileError, SurfaceError};
use crate::surface::{BatchCompletion, RenderSurface};

/// What an apply step left behind on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A batch was closed; its completion is pending.
    Issued,
    /// Nothing to do for this step, no batch was opened.
    Skipped,
}

pub fn apply_structural(
    surface: &mut dyn RenderSurface,
    changeset: &Changeset,
    target: &Snapshot,
    completion: impl FnOnce() -> BatchCompletion,
) -> Result<ApplyOutcome, ReconcileError> {
    if !changeset.has_structural_changes() {
        return Ok(ApplyOutcome::Skipped);
    }
    run_batch(surface, ApplyPhase::Structural, target, completion, |surface| {
        let sections = &changeset.sections;
        if !sections.removals.is_empty() {
            log::trace!("delete_sections {:?}", sections.removals);
            surface.delete_sections(&sections.removals)?;
        }
        if !sections.inserts.is_empty() {
            log::trace!("insert_sections {:?}", sections.inserts);
            surface.insert_sections(&sections.inserts)?;
        }
        for mv in &sections.moves {
            log::trace!("move_section {} -> {}", mv.from, mv.to);
            surface.move_section(mv.from, mv.to)?;
        }

        for (&section, items) in &changeset.items {
            if !items.removals.is_empty() {
                log::trace!("delete_items {section}: {:?}", items.removals);
                surface.delete_items(section, &items.removals)?;
            }
            if !items.inserts.is_empty() {
                log::trace!("insert_items {section}: {:?}", items.inserts);
                surface.insert_items(section, &items.inserts)?;
            }
            for mv in &items.moves {
                log::trace!("move_item {section}: {} -> {}", mv.from, mv.to);
                surface.move_item(section, mv.from, mv.to)?;
            }
        }
        Ok(())
    })
}

/// Issues the deferred reload batch: whole-section reloads first, then the
/// union of tie-break reloads and mutations per section.
pub fn apply_reloads(
    surface: &mut dyn RenderSurface,
    changeset: &Changeset,
    target: &Snapshot,
    completion: impl FnOnce() -> BatchCompletion,
) -> Result<ApplyOutcome, ReconcileError> {
    if !changeset.has_reloads() {
        return Ok(ApplyOutcome::Skipped);
    }
    run_batch(surface, ApplyPhase::Reloads, target, completion, |surface| {
        if !changeset.sections.reloads.is_empty() {
            log::trace!("reload_sections {:?}", changeset.sections.reloads);
            surface.reload_sections(&changeset.sections.reloads)?;
        }
        for (&section, items) in &changeset.items {
            let targets = items.reload_targets();
            if !targets.is_empty() {
                log::trace!("reload_items {section}: {targets:?}");
                surface.reload_items(section, &targets)?;
            }
        }
        Ok(())
    })
}

fn run_batch(
    surface: &mut dyn RenderSurface,
    phase: ApplyPhase,
    target: &Snapshot,
    completion: impl FnOnce() -> BatchCompletion,
    ops: impl FnOnce(&mut dyn RenderSurface) -> Result<(), SurfaceError>,
) -> Result<ApplyOutcome, ReconcileError> {
    surface
        .begin_batch(target)
        .map_err(|err| ReconcileError::surface(phase, err))?;

    if let Err(err) = ops(surface) {
        // Close the batch so the surface is not left half-open.
        if let Err(close) = surface.end_batch(BatchCompletion::detached()) {
            log::debug!("closing aborted {phase} failed: {close}");
        }
        return Err(ReconcileError::surface(phase, err));
    }

    surface
        .end_batch(completion())
        .map_err(|err| ReconcileError::surface(phase, err))?;
    Ok(ApplyOutcome::Issued)
}

#[cfg(test)]
#[path = "tests/apply_tests.rs"]
mod tests;
