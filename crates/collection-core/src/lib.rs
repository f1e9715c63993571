#![doc = r"Identity model, snapshot flattening and two-level diffing for sectioned collections."]

pub mod collections;
pub mod diff;
pub mod flatten;
pub mod identity;
pub mod model;
pub mod node;
pub mod state;

pub use diff::{
    diff, diff_items, diff_with, longest_increasing_subsequence, Changeset, ChangesetSummary,
    DiffOptions, IndexChanges, Move,
};
pub use flatten::{flatten, Flattened};
pub use identity::{Identifiable, Identity, Keyed};
pub use model::{DragSource, IndexPath, Item, LifecycleObserver, Section, Snapshot, Supplementary};
pub use node::{BodyElement, BodyNode, Node, ReactiveNode, SectionDecl, SectionNode};
pub use state::{MutableState, ReactiveSource, SourceId, Subscription};
