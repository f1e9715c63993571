use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use super::*;
use crate::error::SurfaceError;
use collection_core::{DragSource, Identity, Keyed, LifecycleObserver, MutableState, Node};

#[derive(Default)]
struct Shared {
    calls: Vec<String>,
    completions: VecDeque<BatchCompletion>,
    hold: bool,
    fail_on: Option<&'static str>,
}

/// Counts calls by name and either completes batches inline or holds them.
#[derive(Clone, Default)]
struct ScriptedSurface(Rc<RefCell<Shared>>);

impl ScriptedSurface {
    fn holding() -> Self {
        let surface = Self::default();
        surface.0.borrow_mut().hold = true;
        surface
    }

    fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    fn count(&self, name: &str) -> usize {
        self.0.borrow().calls.iter().filter(|call| *call == name).count()
    }

    fn fail_on(&self, name: &'static str) {
        self.0.borrow_mut().fail_on = Some(name);
    }

    fn release_one(&self) -> bool {
        let completion = self.0.borrow_mut().completions.pop_front();
        match completion {
            Some(completion) => {
                completion.complete();
                true
            }
            None => false,
        }
    }

    fn record(&self, name: &str) -> Result<(), SurfaceError> {
        let mut shared = self.0.borrow_mut();
        if shared.fail_on == Some(name) {
            return Err(SurfaceError::Rejected(name.to_string()));
        }
        shared.calls.push(name.to_string());
        Ok(())
    }
}

impl RenderSurface for ScriptedSurface {
    fn begin_batch(&mut self, _target: &Snapshot) -> Result<(), SurfaceError> {
        self.record("begin")
    }

    fn end_batch(&mut self, completion: BatchCompletion) -> Result<(), SurfaceError> {
        self.record("end")?;
        let inline = {
            let mut shared = self.0.borrow_mut();
            if shared.hold && !completion.is_detached() {
                shared.completions.push_back(completion);
                None
            } else {
                Some(completion)
            }
        };
        if let Some(completion) = inline {
            completion.complete();
        }
        Ok(())
    }

    fn delete_sections(&mut self, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("delete_sections")
    }

    fn insert_sections(&mut self, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("insert_sections")
    }

    fn move_section(&mut self, _: usize, _: usize) -> Result<(), SurfaceError> {
        self.record("move_section")
    }

    fn reload_sections(&mut self, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("reload_sections")
    }

    fn delete_items(&mut self, _: usize, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("delete_items")
    }

    fn insert_items(&mut self, _: usize, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("insert_items")
    }

    fn move_item(&mut self, _: usize, _: usize, _: usize) -> Result<(), SurfaceError> {
        self.record("move_item")
    }

    fn reload_items(&mut self, _: usize, _: &BTreeSet<usize>) -> Result<(), SurfaceError> {
        self.record("reload_items")
    }

    fn reset_all(&mut self, _: &Snapshot) -> Result<(), SurfaceError> {
        self.record("reset_all")
    }
}

fn rows_section(rows: &MutableState<Vec<(String, u32)>>) -> SectionNode {
    Node::section(
        Identity::of("rows"),
        [Node::each(rows, |_, (key, value)| {
            Node::item(Keyed::new(key, *value))
        })],
    )
}

fn rows(keys: &[&str]) -> Vec<(String, u32)> {
    keys.iter().map(|key| (key.to_string(), 0)).collect()
}

#[test]
fn first_load_uses_reset_all_and_settles() {
    let state = MutableState::new(rows(&["a", "b"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());

    reconciler.request_reload().unwrap();

    assert_eq!(surface.calls(), vec!["reset_all"]);
    assert!(reconciler.is_idle());
    assert_eq!(reconciler.number_of_sections(), 1);
    assert_eq!(reconciler.number_of_items(0), 2);
    assert_eq!(reconciler.stats().resets, 1);
    assert_eq!(reconciler.subscribed_sources(), vec![state.id()]);
}

#[test]
fn state_change_runs_a_diffed_pass() {
    let state = MutableState::new(rows(&["a", "b"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();

    state.update(|rows| rows.push(("c".to_string(), 0)));

    assert_eq!(
        surface.calls(),
        vec!["reset_all", "begin", "insert_items", "end"]
    );
    assert_eq!(reconciler.number_of_items(0), 3);
    assert!(reconciler.is_idle());
}

#[test]
fn equal_write_does_not_trigger() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();

    state.set(rows(&["a"]));

    assert_eq!(reconciler.stats().passes, 1);
}

#[test]
fn triggers_during_a_pass_collapse_into_one_follow_up() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::holding();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();

    state.update(|rows| rows.push(("b".to_string(), 0)));
    assert_eq!(reconciler.state(), SchedulerState::Applying);
    assert_eq!(reconciler.number_of_items(0), 2);

    state.update(|rows| rows.push(("c".to_string(), 0)));
    state.update(|rows| rows.push(("d".to_string(), 0)));
    reconciler.request_reload().unwrap();
    assert_eq!(reconciler.state().pending(), 3);
    assert_eq!(surface.count("begin"), 1);

    assert!(surface.release_one());
    // Exactly one follow-up pass, diffed straight to the latest content.
    assert_eq!(surface.count("begin"), 2);
    assert_eq!(reconciler.number_of_items(0), 4);
    assert!(surface.release_one());
    assert!(!surface.release_one());

    assert!(reconciler.is_idle());
    let stats = reconciler.stats();
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.coalesced_triggers, 3);
}

#[test]
fn reloads_wait_for_the_structural_batch() {
    let state = MutableState::new(vec![("a".to_string(), 0), ("b".to_string(), 0)]);
    let surface = ScriptedSurface::holding();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();

    state.set(vec![
        ("a".to_string(), 1),
        ("b".to_string(), 0),
        ("c".to_string(), 0),
    ]);
    assert_eq!(surface.count("reload_items"), 0);

    assert!(surface.release_one());
    assert_eq!(surface.count("reload_items"), 1);
    assert!(reconciler.state().is_applying());

    assert!(surface.release_one());
    assert!(reconciler.is_idle());
    assert_eq!(reconciler.stats().batches, 2);
}

#[test]
fn reset_failure_is_returned_and_leaves_scheduler_idle() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    surface.fail_on("reset_all");
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());

    let err = reconciler.request_reload().unwrap_err();

    assert_eq!(err.phase(), ApplyPhase::Reset);
    assert!(reconciler.is_idle());
    assert_eq!(reconciler.number_of_sections(), 0);
    assert_eq!(reconciler.last_error(), Some(err));
    assert_eq!(reconciler.stats().failures, 1);
}

#[test]
fn structural_failure_keeps_previous_commit() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();
    surface.fail_on("insert_items");

    state.update(|rows| rows.push(("b".to_string(), 0)));

    assert!(reconciler.is_idle());
    assert_eq!(reconciler.number_of_items(0), 1);
    let err = reconciler.take_last_error().unwrap();
    assert_eq!(err.phase(), ApplyPhase::Structural);
    assert!(reconciler.last_error().is_none());
}

#[test]
fn reload_failure_resets_on_the_next_pass() {
    let state = MutableState::new(rows(&["a", "b"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();
    surface.fail_on("reload_items");

    state.update(|rows| rows[0].1 = 7);

    let err = reconciler.take_last_error().unwrap();
    assert_eq!(err.phase(), ApplyPhase::Reloads);
    assert!(reconciler.is_idle());
    assert!(reconciler.needs_reset());

    surface.0.borrow_mut().fail_on = None;
    reconciler.request_reload().unwrap();
    assert_eq!(surface.count("reset_all"), 2);
    assert!(!reconciler.needs_reset());
    assert!(reconciler.last_error().is_none());
}

#[test]
fn failed_reset_is_retried_by_the_next_pass() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();
    surface.fail_on("reset_all");

    assert!(reconciler.force_reset().is_err());
    assert!(reconciler.needs_reset());

    surface.0.borrow_mut().fail_on = None;
    state.update(|rows| rows.push(("b".to_string(), 0)));
    assert_eq!(surface.count("reset_all"), 2);
    assert_eq!(surface.count("insert_items"), 0);
    assert_eq!(reconciler.number_of_items(0), 2);
}

#[test]
fn force_reset_ignores_the_empty_baseline_option() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let options = ReconcilerOptions {
        reset_on_empty_baseline: false,
        ..ReconcilerOptions::default()
    };
    let reconciler =
        CollectionReconciler::with_options([rows_section(&state)], surface.clone(), options);
    reconciler.request_reload().unwrap();
    reconciler.force_reset().unwrap();
    assert_eq!(surface.count("reset_all"), 1);
    assert_eq!(surface.count("insert_sections"), 1);
}

#[test]
fn force_reset_renders_from_scratch() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();
    reconciler.force_reset().unwrap();
    assert_eq!(surface.count("reset_all"), 2);
}

#[test]
fn diff_path_inserts_everything_when_reset_is_disabled() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::default();
    let options = ReconcilerOptions {
        reset_on_empty_baseline: false,
        ..ReconcilerOptions::default()
    };
    let reconciler =
        CollectionReconciler::with_options([rows_section(&state)], surface.clone(), options);
    reconciler.request_reload().unwrap();
    assert_eq!(surface.calls(), vec!["begin", "insert_sections", "end"]);
}

#[test]
fn subscriptions_follow_reachable_sources() {
    let toggle = MutableState::new(true);
    let detail = MutableState::new(rows(&["x"]));
    let detail_for_builder = detail.clone();
    let content = [Node::reactive(&toggle, move |show| {
        let detail = detail_for_builder.clone();
        Node::when(*show, move || rows_section(&detail))
    })];
    let reconciler = CollectionReconciler::new(content, ScriptedSurface::default());
    reconciler.request_reload().unwrap();
    assert_eq!(reconciler.subscribed_sources(), vec![toggle.id(), detail.id()]);
    assert_eq!(detail.listener_count(), 1);

    toggle.set(false);
    assert_eq!(reconciler.subscribed_sources(), vec![toggle.id()]);
    assert_eq!(detail.listener_count(), 0);

    // Unreachable now, so this write must not start a pass.
    let passes = reconciler.stats().passes;
    detail.set(rows(&["y"]));
    assert_eq!(reconciler.stats().passes, passes);
}

#[test]
fn dropping_the_reconciler_unsubscribes() {
    let state = MutableState::new(rows(&["a"]));
    let reconciler = CollectionReconciler::new([rows_section(&state)], ScriptedSurface::default());
    reconciler.request_reload().unwrap();
    assert_eq!(state.listener_count(), 1);
    drop(reconciler);
    assert_eq!(state.listener_count(), 0);
}

#[test]
fn late_completion_after_drop_is_ignored() {
    let state = MutableState::new(rows(&["a"]));
    let surface = ScriptedSurface::holding();
    let reconciler = CollectionReconciler::new([rows_section(&state)], surface.clone());
    reconciler.request_reload().unwrap();
    state.update(|rows| rows.push(("b".to_string(), 0)));
    drop(reconciler);
    assert!(surface.release_one());
}

struct Draggable;

impl DragSource for Draggable {
    fn can_drag(&self, at: IndexPath) -> bool {
        at.item > 0
    }

    fn drag_payload(&self, at: IndexPath) -> Option<String> {
        Some(format!("row {}", at.item))
    }
}

#[derive(Clone, Default)]
struct Observer {
    events: Rc<RefCell<Vec<String>>>,
}

impl LifecycleObserver for Observer {
    fn will_display(&self, at: IndexPath) {
        self.events.borrow_mut().push(format!("display {at}"));
    }

    fn did_select(&self, at: IndexPath) {
        self.events.borrow_mut().push(format!("select {at}"));
    }

    fn should_highlight(&self, _at: IndexPath) -> bool {
        false
    }
}

#[test]
fn capabilities_dispatch_against_committed_snapshot() {
    let observer = Observer::default();
    let rows: Vec<Item> = ["a", "b"]
        .iter()
        .map(|key| {
            Item::new(Keyed::new(key, ()))
                .with_drag(Draggable)
                .with_lifecycle(observer.clone())
        })
        .collect();
    let plain = Item::new(Keyed::new("plain", ()));
    let content = [Node::section(
        Identity::of("s"),
        rows.into_iter().chain([plain]).map(Node::from),
    )];
    let reconciler = CollectionReconciler::new(content, ScriptedSurface::default());
    reconciler.request_reload().unwrap();

    assert!(!reconciler.can_drag(IndexPath::new(0, 0)));
    assert!(reconciler.can_drag(IndexPath::new(0, 1)));
    assert!(!reconciler.can_drag(IndexPath::new(0, 2)));
    assert_eq!(reconciler.drag_payload(IndexPath::new(0, 1)).as_deref(), Some("row 1"));
    assert_eq!(reconciler.drag_payload(IndexPath::new(0, 0)), None);

    reconciler.will_display(IndexPath::new(0, 1));
    reconciler.did_select(IndexPath::new(0, 0));
    reconciler.did_select(IndexPath::new(0, 2));
    reconciler.did_select(IndexPath::new(3, 0));
    assert_eq!(
        *observer.events.borrow(),
        vec!["display [0, 1]".to_string(), "select [0, 0]".to_string()]
    );

    assert!(!reconciler.should_highlight(IndexPath::new(0, 0)));
    assert!(reconciler.should_highlight(IndexPath::new(0, 2)));
    assert!(!reconciler.should_highlight(IndexPath::new(9, 9)));
}
