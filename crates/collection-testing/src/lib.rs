//! Testing utilities for collection reconciliation

pub mod fixtures;
pub mod memory;

pub use fixtures::*;
pub use memory::*;

pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::memory::{CompletionMode, MemorySurface, OpKind, SurfaceOp};
}
