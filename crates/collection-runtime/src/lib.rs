#![doc = r"Scheduler, apply orchestrator and render-surface contract for sectioned collections."]

pub mod apply;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod size_cache;
pub mod surface;

pub use apply::{apply_reloads, apply_structural, ApplyOutcome};
pub use error::{ApplyPhase, IndexScope, ReconcileError, SurfaceError};
pub use reconciler::{CollectionReconciler, ReconcileStats, ReconcilerOptions};
pub use scheduler::{PassOutcome, SchedulerState, TriggerOutcome};
pub use size_cache::{Size, SizeCache, SizeCacheConfig, SizeKey};
pub use surface::{BatchCompletion, RenderSurface};
