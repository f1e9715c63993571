use collection_core::{diff, Identity, Item, Keyed, Section, Snapshot, Supplementary};
use collection_runtime::{apply_structural, BatchCompletion};
use collection_testing::{apply_diff, label, row_with, section, snapshot, MemorySurface, OpKind};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use proptest::sample::subsequence;

fn assert_round_trip(previous: &Snapshot, current: &Snapshot) {
    let mut surface = MemorySurface::showing(previous);
    apply_diff(&mut surface, previous, current).unwrap();
    assert!(
        surface.matches(current),
        "rendered {:?} != {:?}",
        surface.section_identities(),
        current.section_identities().collect::<Vec<_>>()
    );
}

#[test]
fn sections_insert_remove_and_move() {
    let previous = snapshot(&[("a", &["1"]), ("b", &[]), ("c", &["2", "3"]), ("d", &[])]);
    let current = snapshot(&[("d", &[]), ("x", &["9"]), ("a", &["1"]), ("c", &["3", "2"])]);
    assert_round_trip(&previous, &current);
}

#[test]
fn swap_uses_one_move() {
    let previous = snapshot(&[("A", &[]), ("B", &[]), ("C", &[]), ("D", &[])]);
    let current = snapshot(&[("B", &[]), ("A", &[]), ("C", &[]), ("D", &[])]);
    let mut surface = MemorySurface::showing(&previous);
    apply_diff(&mut surface, &previous, &current).unwrap();
    assert_eq!(surface.count(OpKind::MoveSection), 1);
    assert!(surface.matches(&current));
}

#[test]
fn tie_break_reload_round_trips() {
    let previous = snapshot(&[("s", &["X", "Y"])]);
    let current = snapshot(&[("s", &["P", "Q"])]);
    let mut surface = MemorySurface::showing(&previous);
    apply_diff(&mut surface, &previous, &current).unwrap();
    assert_eq!(surface.count(OpKind::ReloadItems), 1);
    assert_eq!(surface.count(OpKind::DeleteItems), 0);
    assert_eq!(surface.count(OpKind::InsertItems), 0);
    assert!(surface.matches(&current));
}

#[test]
fn pinned_reload_slot_survives_neighbour_moves() {
    let previous = snapshot(&[("s", &["A", "X", "B"])]);
    let current = snapshot(&[("s", &["B", "P", "A"])]);
    assert_round_trip(&previous, &current);
}

#[test]
fn pinned_slot_stays_while_rows_cross_it() {
    let previous = snapshot(&[("s", &["a", "b", "X", "c"])]);
    let current = snapshot(&[("s", &["c", "a", "P", "b"])]);
    let mut surface = MemorySurface::showing(&previous);
    apply_diff(&mut surface, &previous, &current).unwrap();
    assert_eq!(surface.count(OpKind::MoveItem), 2);
    assert_eq!(surface.count(OpKind::ReloadItems), 1);
    assert!(surface.matches(&current));
}

#[test]
fn header_change_with_new_rows_round_trips() {
    let previous = Snapshot::new(vec![section("s", &["a"]).with_header(label("h", "Old"))]);
    let current = Snapshot::new(vec![section("s", &["a", "b"])
        .with_header(label("h", "New"))
        .with_footer(label("f", "Footer"))]);
    assert_round_trip(&previous, &current);
}

#[test]
fn mutated_rows_are_reloaded_after_moves() {
    let previous = Snapshot::new(vec![
        section("s", &[]).with_items([row_with("a", 1), row_with("b", 1), row_with("c", 1)])
    ]);
    let current = Snapshot::new(vec![
        section("s", &[]).with_items([row_with("c", 2), row_with("a", 1), row_with("b", 3)])
    ]);
    assert_round_trip(&previous, &current);
}

#[test]
fn item_ops_target_the_moved_section() {
    let previous = snapshot(&[("s1", &["a", "b"]), ("s2", &["c"])]);
    let current = snapshot(&[("s2", &["c", "d"]), ("s1", &["b"])]);
    assert_round_trip(&previous, &current);
}

#[test]
fn duplicate_identities_still_round_trip() {
    let previous = snapshot(&[("s", &["a", "a", "b"]), ("s", &["z"])]);
    let current = snapshot(&[("s", &["b", "a", "a"])]);
    assert_round_trip(&previous, &current);
}

#[test]
fn clearing_and_refilling() {
    let full = snapshot(&[("a", &["1", "2"]), ("b", &["3"])]);
    let empty = Snapshot::default();
    assert_round_trip(&full, &empty);
    assert_round_trip(&empty, &full);
}

#[test]
fn identical_snapshots_issue_nothing() {
    let current = snapshot(&[("a", &["1", "2"]), ("b", &["3"])]);
    let mut surface = MemorySurface::showing(&current);
    apply_diff(&mut surface, &current, &current).unwrap();
    assert!(surface.ops().is_empty());
}

#[test]
fn stale_baseline_is_reported_not_repaired() {
    // The surface shows something other than the diff baseline.
    let shown = snapshot(&[("a", &[])]);
    let previous = snapshot(&[("a", &[]), ("b", &[]), ("c", &[])]);
    let current = snapshot(&[("a", &[])]);
    let mut surface = MemorySurface::showing(&shown);
    let changeset = diff(&previous, &current);
    let err = apply_structural(&mut surface, &changeset, &current, BatchCompletion::detached)
        .unwrap_err();
    assert!(err.to_string().starts_with("structural batch failed"));
    assert!(surface.matches(&shown));
    assert!(!surface.is_batch_open());
}

type SectionSpec = (u8, Option<u8>, Vec<(u8, u8)>);

fn arb_rows() -> impl Strategy<Value = Vec<(u8, u8)>> {
    subsequence((0u8..12).collect::<Vec<_>>(), 0..=12)
        .prop_shuffle()
        .prop_flat_map(|keys| {
            let len = keys.len();
            (Just(keys), vec(0u8..2, len))
        })
        .prop_map(|(keys, values)| keys.into_iter().zip(values).collect())
}

fn arb_snapshot() -> impl Strategy<Value = Vec<SectionSpec>> {
    subsequence((0u8..6).collect::<Vec<_>>(), 0..=6)
        .prop_shuffle()
        .prop_flat_map(|keys| {
            let len = keys.len();
            (Just(keys), vec(option::of(0u8..2), len), vec(arb_rows(), len))
        })
        .prop_map(|(keys, headers, rows)| {
            keys.into_iter()
                .zip(headers)
                .zip(rows)
                .map(|((key, header), rows)| (key, header, rows))
                .collect()
        })
}

fn build(specs: &[SectionSpec]) -> Snapshot {
    specs
        .iter()
        .map(|(key, header, rows)| {
            let section = Section::new(Identity::new(u64::from(*key))).with_items(
                rows.iter().map(|(row, value)| {
                    Item::new(Keyed::with_identity(Identity::new(1000 + u64::from(*row)), *value))
                }),
            );
            match header {
                Some(title) => section.with_header(Supplementary::new(Keyed::with_identity(
                    Identity::new(500),
                    *title,
                ))),
                None => section,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn applying_the_diff_reproduces_the_target(previous in arb_snapshot(), current in arb_snapshot()) {
        let previous = build(&previous);
        let current = build(&current);
        let mut surface = MemorySurface::showing(&previous);
        prop_assert!(apply_diff(&mut surface, &previous, &current).is_ok());
        prop_assert!(surface.matches(&current));
    }

    #[test]
    fn reconciling_twice_is_a_no_op(specs in arb_snapshot()) {
        let snapshot = build(&specs);
        prop_assert!(diff(&snapshot, &snapshot).is_empty());
        prop_assert!(diff(&snapshot, &build(&specs)).is_empty());
    }
}
