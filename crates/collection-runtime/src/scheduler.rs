//! Three-state machine that serializes reconciliation passes.
//!
//! At most one pass is in flight against the surface. Triggers that arrive
//! while a pass is applying are only counted; when the pass completes a single
//! follow-up pass runs with whatever the content looks like at that point.

use std::num::NonZeroUsize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Applying,
    ApplyingWithPending(NonZeroUsize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The scheduler was idle; the caller starts a pass now.
    StartPass,
    /// A pass is in flight; the trigger was folded into the pending count.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Settled,
    /// Triggers arrived during the pass; run exactly one more.
    Rerun { coalesced: usize },
}

impl SchedulerState {
    pub fn is_idle(self) -> bool {
        matches!(self, SchedulerState::Idle)
    }

    pub fn is_applying(self) -> bool {
        !self.is_idle()
    }

    pub fn pending(self) -> usize {
        match self {
            SchedulerState::ApplyingWithPending(pending) => pending.get(),
            _ => 0,
        }
    }

    pub fn on_trigger(self) -> (Self, TriggerOutcome) {
        match self {
            SchedulerState::Idle => (SchedulerState::Applying, TriggerOutcome::StartPass),
            SchedulerState::Applying => (
                SchedulerState::ApplyingWithPending(NonZeroUsize::MIN),
                TriggerOutcome::Coalesced,
            ),
            SchedulerState::ApplyingWithPending(pending) => (
                SchedulerState::ApplyingWithPending(pending.saturating_add(1)),
                TriggerOutcome::Coalesced,
            ),
        }
    }

    pub fn on_pass_complete(self) -> (Self, PassOutcome) {
        match self {
            SchedulerState::ApplyingWithPending(pending) => (
                SchedulerState::Applying,
                PassOutcome::Rerun {
                    coalesced: pending.get(),
                },
            ),
            SchedulerState::Applying => (SchedulerState::Idle, PassOutcome::Settled),
            SchedulerState::Idle => {
                log::debug!("pass completion while idle ignored");
                (SchedulerState::Idle, PassOutcome::Settled)
            }
        }
    }

    /// Failed passes drop pending triggers and return to idle.
    pub fn on_pass_failed(self) -> Self {
        if self.pending() > 0 {
            log::debug!("dropping {} pending trigger(s) after failure", self.pending());
        }
        SchedulerState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_trigger_starts_a_pass() {
        let (state, outcome) = SchedulerState::Idle.on_trigger();
        assert_eq!(state, SchedulerState::Applying);
        assert_eq!(outcome, TriggerOutcome::StartPass);
    }

    #[test]
    fn triggers_during_a_pass_are_counted() {
        let mut state = SchedulerState::Applying;
        for _ in 0..3 {
            let (next, outcome) = state.on_trigger();
            assert_eq!(outcome, TriggerOutcome::Coalesced);
            state = next;
        }
        assert_eq!(state.pending(), 3);
        assert!(state.is_applying());
    }

    #[test]
    fn completion_collapses_pending_into_one_rerun() {
        let state = SchedulerState::ApplyingWithPending(NonZeroUsize::new(3).unwrap());
        let (state, outcome) = state.on_pass_complete();
        assert_eq!(outcome, PassOutcome::Rerun { coalesced: 3 });
        assert_eq!(state, SchedulerState::Applying);

        let (state, outcome) = state.on_pass_complete();
        assert_eq!(outcome, PassOutcome::Settled);
        assert!(state.is_idle());
    }

    #[test]
    fn failure_returns_to_idle() {
        let state = SchedulerState::ApplyingWithPending(NonZeroUsize::new(2).unwrap());
        assert_eq!(state.on_pass_failed(), SchedulerState::Idle);
        assert_eq!(SchedulerState::Applying.on_pass_failed(), SchedulerState::Idle);
    }
}
