use std::fmt;

/// Which index space an out-of-range index was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScope {
    Section,
    Item { section: usize },
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexScope::Section => f.write_str("section"),
            IndexScope::Item { section } => write!(f, "item of section {section}"),
        }
    }
}

/// Error reported by a [`crate::RenderSurface`] for a rejected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    IndexOutOfRange {
        scope: IndexScope,
        index: usize,
        len: usize,
    },
    NoOpenBatch,
    BatchAlreadyOpen,
    /// The batch left a different number of entries than the target snapshot holds.
    CountMismatch {
        scope: IndexScope,
        expected: usize,
        actual: usize,
    },
    ConflictingOperation(String),
    Rejected(String),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::IndexOutOfRange { scope, index, len } => {
                write!(f, "{scope} index {index} out of range (len {len})")
            }
            SurfaceError::NoOpenBatch => f.write_str("operation issued outside a batch"),
            SurfaceError::BatchAlreadyOpen => f.write_str("a batch is already open"),
            SurfaceError::CountMismatch {
                scope,
                expected,
                actual,
            } => write!(
                f,
                "{scope} count mismatch after batch; expected {expected}, found {actual}"
            ),
            SurfaceError::ConflictingOperation(message) => {
                write!(f, "conflicting operation: {message}")
            }
            SurfaceError::Rejected(message) => write!(f, "rejected by surface: {message}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// Stage of a reconciliation pass that talks to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Reset,
    Structural,
    Reloads,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyPhase::Reset => "reset",
            ApplyPhase::Structural => "structural batch",
            ApplyPhase::Reloads => "reload batch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    Surface {
        phase: ApplyPhase,
        source: SurfaceError,
    },
}

impl ReconcileError {
    pub fn surface(phase: ApplyPhase, source: SurfaceError) -> Self {
        ReconcileError::Surface { phase, source }
    }

    pub fn phase(&self) -> ApplyPhase {
        match self {
            ReconcileError::Surface { phase, .. } => *phase,
        }
    }

    pub fn surface_error(&self) -> &SurfaceError {
        match self {
            ReconcileError::Surface { source, .. } => source,
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Surface { phase, source } => write!(f, "{phase} failed: {source}"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Surface { source, .. } => Some(source),
        }
    }
}
