use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use proptest::prelude::*;
use scopemap::{OverlayMap, ScopedContext};

// ── Reference-model simulation ────────────────────────────────────────────────

/// One overlay mutation, drawn over a small key universe so that inserts,
/// removals and base keys collide often.
#[derive(Debug, Clone)]
enum Op {
    Insert(u8, i32),
    Remove(u8),
    Clear,
}

fn key(n: u8) -> String {
    format!("k{n}")
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..8u8, any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => (0..8u8).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn base_map() -> impl Strategy<Value = IndexMap<String, i32>> {
    proptest::collection::btree_map(0..8u8, any::<i32>(), 0..6)
        .prop_map(|m| m.into_iter().map(|(k, v)| (key(k), v)).collect())
}

proptest! {
    /// After any mutation sequence the overlay agrees with a plain map that
    /// started from the same base, on every operation's return value and on
    /// the whole visible surface — and the wrapped base is never touched.
    #[test]
    fn overlay_matches_reference_model(
        base in base_map(),
        ops in proptest::collection::vec(op(), 0..40),
    ) {
        let target = Arc::new(OverlayMap::from(base.clone()));
        let mut overlay = OverlayMap::wrap(Arc::clone(&target));
        let mut model: IndexMap<String, i32> = base.clone();

        for op in &ops {
            match *op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(overlay.insert(key(k), v), model.insert(key(k), v));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(
                        overlay.remove(key(k).as_str()),
                        model.shift_remove(key(k).as_str())
                    );
                }
                Op::Clear => {
                    overlay.clear();
                    model.clear();
                }
            }
        }

        prop_assert_eq!(overlay.len(), model.len());
        prop_assert_eq!(overlay.is_empty(), model.is_empty());
        for n in 0..8u8 {
            let k = key(n);
            prop_assert_eq!(overlay.get(k.as_str()), model.get(k.as_str()));
            prop_assert_eq!(overlay.contains_key(k.as_str()), model.contains_key(k.as_str()));
        }

        let mut seen: Vec<(String, i32)> =
            overlay.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let mut expected: Vec<(String, i32)> =
            model.iter().map(|(k, v)| (k.clone(), *v)).collect();
        seen.sort();
        expected.sort();
        prop_assert_eq!(seen, expected);

        for (k, v) in &base {
            prop_assert_eq!(target.get(k.as_str()), Some(v));
        }
        prop_assert_eq!(target.len(), base.len());
    }
}

proptest! {
    /// `len()` and `is_empty()` always agree with key iteration counted
    /// independently.
    #[test]
    fn len_agrees_with_key_iteration(
        base in base_map(),
        ops in proptest::collection::vec(op(), 0..40),
    ) {
        let mut overlay = OverlayMap::wrap(Arc::new(OverlayMap::from(base)));
        for op in &ops {
            match *op {
                Op::Insert(k, v) => { overlay.insert(key(k), v); }
                Op::Remove(k) => { overlay.remove(key(k).as_str()); }
                Op::Clear => overlay.clear(),
            }
            prop_assert_eq!(overlay.len(), overlay.keys().count());
            prop_assert_eq!(overlay.is_empty(), overlay.keys().count() == 0);
        }
    }
}

proptest! {
    /// A removed key becomes visible again on re-insertion, regardless of
    /// what happened before.
    #[test]
    fn remove_then_insert_restores_visibility(
        base in base_map(),
        ops in proptest::collection::vec(op(), 0..20),
        k in 0..8u8,
        v in any::<i32>(),
    ) {
        let mut overlay = OverlayMap::wrap(Arc::new(OverlayMap::from(base)));
        for op in &ops {
            match *op {
                Op::Insert(k, v) => { overlay.insert(key(k), v); }
                Op::Remove(k) => { overlay.remove(key(k).as_str()); }
                Op::Clear => overlay.clear(),
            }
        }
        overlay.remove(key(k).as_str());
        overlay.insert(key(k), v);
        prop_assert!(overlay.contains_key(key(k).as_str()));
        prop_assert_eq!(overlay.get(key(k).as_str()), Some(&v));
    }
}

proptest! {
    /// Identically-built overlays iterate in an identical order.
    #[test]
    fn iteration_order_is_deterministic(
        base in base_map(),
        ops in proptest::collection::vec(op(), 0..30),
    ) {
        let build = || {
            let mut overlay = OverlayMap::wrap(Arc::new(OverlayMap::from(base.clone())));
            for op in &ops {
                match *op {
                    Op::Insert(k, v) => { overlay.insert(key(k), v); }
                    Op::Remove(k) => { overlay.remove(key(k).as_str()); }
                    Op::Clear => overlay.clear(),
                }
            }
            overlay
        };
        let first = build();
        let second = build();
        let first_keys: Vec<String> = first.keys().cloned().collect();
        let second_keys: Vec<String> = second.keys().cloned().collect();
        prop_assert_eq!(first_keys, second_keys);
    }
}

// ── Lineage-wide ID sequences ─────────────────────────────────────────────────

/// Sibling scopes walked from different threads draw from the same counter
/// table and never observe a duplicate sequence number.
#[test]
fn sibling_scopes_never_share_a_sequence_number() {
    let root: ScopedContext<i32> = ScopedContext::new(IndexMap::new(), HashSet::new());
    let mut seen = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|branch| {
                let child = root.add_local_variables(IndexMap::from([(
                    "branch".to_owned(),
                    branch,
                )]));
                scope.spawn(move || {
                    (0..25).map(|_| child.take_id_seq("node")).collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            seen.extend(handle.join().unwrap());
        }
    });
    seen.sort_unstable();
    let expected: Vec<u64> = (1..=100).collect();
    assert_eq!(seen, expected);
}
