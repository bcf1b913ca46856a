#![cfg(test)]

// Property tests for OrderedTable kept inside the crate so cursors and node
// accounting are reachable without widening the public surface.

use crate::key::Key;
use crate::ordered_table::{Cursor, OrderedTable};
use proptest::prelude::*;
use std::hash::Hasher;

// Six canonical keys, each reachable through two raw spellings so that
// normalization and SameValueZero are exercised on every index touch.
fn raw_key(slot: usize, alt: bool) -> Key {
    match (slot, alt) {
        (0, false) => Key::Integer(0),
        (0, true) => Key::Number(-0.0),
        (1, false) => Key::Number(f64::NAN),
        (1, true) => Key::Number(f64::from_bits(f64::NAN.to_bits() | 0x5)),
        (2, false) => Key::Integer(1),
        (2, true) => Key::Number(1.0),
        (3, _) => Key::from("a"),
        (4, false) => Key::Null,
        (4, true) => Key::from(None::<i32>),
        _ => Key::Undefined,
    }
}

const SLOTS: usize = 6;

#[derive(Clone, Debug)]
enum Op {
    Put(usize, bool, i32),
    Delete(usize, bool),
    Get(usize, bool),
    Clear,
    Open,
    Advance(usize),
    HasNext(usize),
    Close(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let slot = 0..SLOTS;
    let op = prop_oneof![
        4 => (slot.clone(), any::<bool>(), any::<i32>()).prop_map(|(k, a, v)| Op::Put(k, a, v)),
        2 => (slot.clone(), any::<bool>()).prop_map(|(k, a)| Op::Delete(k, a)),
        1 => (slot.clone(), any::<bool>()).prop_map(|(k, a)| Op::Get(k, a)),
        1 => Just(Op::Clear),
        1 => Just(Op::Open),
        3 => (0usize..4).prop_map(Op::Advance),
        1 => (0usize..4).prop_map(Op::HasNext),
        1 => (0usize..4).prop_map(Op::Close),
    ];
    proptest::collection::vec(op, 1..80)
}

// Live entries in insertion order, tagged with an append sequence number.
#[derive(Default)]
struct Model {
    live: Vec<(u64, usize, i32)>,
    seq: u64,
}

impl Model {
    fn find(&self, slot: usize) -> Option<usize> {
        self.live.iter().position(|&(_, k, _)| k == slot)
    }

    // First live entry appended after `pos`.
    fn after(&self, pos: u64) -> Option<(u64, usize, i32)> {
        self.live.iter().copied().find(|&(s, _, _)| s > pos)
    }
}

// A cursor yields exactly the live entries appended after the last one it
// returned, whatever was deleted or cleared in between.
struct ModelCursor {
    sut: Option<Cursor>,
    pos: u64,
}

fn run<S: std::hash::BuildHasher>(
    mut sut: OrderedTable<i32, S>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model = Model::default();
    let mut cursors: Vec<ModelCursor> = Vec::new();

    for op in ops {
        let peek_only = matches!(op, Op::HasNext(_));
        match op {
            Op::Put(slot, alt, v) => {
                let prev = sut.put(raw_key(slot, alt), v);
                match model.find(slot) {
                    Some(i) => {
                        prop_assert_eq!(prev, Some(model.live[i].2));
                        model.live[i].2 = v;
                    }
                    None => {
                        prop_assert_eq!(prev, None);
                        model.seq += 1;
                        model.live.push((model.seq, slot, v));
                    }
                }
            }
            Op::Delete(slot, alt) => {
                let got = sut.delete(raw_key(slot, alt));
                let want = model.find(slot).map(|i| model.live.remove(i).2);
                prop_assert_eq!(got, want);
            }
            Op::Get(slot, alt) => {
                let want = model.find(slot).map(|i| model.live[i].2);
                prop_assert_eq!(sut.get(raw_key(slot, alt)).copied(), want);
                prop_assert_eq!(sut.has(raw_key(slot, !alt)), want.is_some());
            }
            Op::Clear => {
                let drained: Vec<i32> = sut.clear().into_iter().map(|(_, v)| v).collect();
                let want: Vec<i32> = model.live.drain(..).map(|(_, _, v)| v).collect();
                prop_assert_eq!(drained, want);
            }
            Op::Open => {
                let c = sut.open_cursor();
                cursors.push(ModelCursor { sut: Some(c), pos: 0 });
            }
            Op::Advance(i) | Op::HasNext(i) => {
                let Some(mc) = cursors.get_mut(i) else { continue };
                let Some(c) = mc.sut.as_mut() else { continue };
                let want = model.after(mc.pos);
                if peek_only {
                    prop_assert_eq!(sut.has_next(c), want.is_some());
                } else {
                    let got = sut.advance(c).map(|(_, v)| *v);
                    prop_assert_eq!(got, want.map(|(_, _, v)| v));
                    if let Some((s, _, _)) = want {
                        mc.pos = s;
                    }
                }
            }
            Op::Close(i) => {
                if let Some(c) = cursors.get_mut(i).and_then(|mc| mc.sut.take()) {
                    sut.close_cursor(c);
                }
            }
        }

        prop_assert_eq!(sut.size(), model.live.len());
        let order: Vec<i32> = sut.entries().map(|(_, v)| *v).collect();
        let want: Vec<i32> = model.live.iter().map(|&(_, _, v)| v).collect();
        prop_assert_eq!(order, want);
    }

    for mc in cursors.iter_mut() {
        if let Some(c) = mc.sut.take() {
            sut.close_cursor(c);
        }
    }
    // With no cursor open, nothing beyond the live nodes and at most one
    // head sentinel may remain allocated.
    let nodes = sut.allocated_nodes();
    prop_assert!(
        nodes <= model.live.len() + 1,
        "leaked nodes: {} for {} live",
        nodes,
        model.live.len()
    );
    Ok(())
}

// Property: OrderedTable agrees with an insertion-order model under random
// put/delete/get/clear with cursors opened, advanced and closed in between.
// Invariants exercised:
// - Uniqueness under SameValueZero across raw spellings of the same key.
// - Re-putting keeps position; delete/clear return the displaced values.
// - Each cursor yields the live entries appended after its last item.
// - Tombstones are reclaimed once no cursor can reach them.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_matches_insertion_order_model(ops in arb_ops()) {
        run(OrderedTable::new(), ops)?;
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl std::hash::BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: same model, every key in one bucket, so equality alone resolves
// lookups.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_matches_model_with_collisions(ops in arb_ops()) {
        run(OrderedTable::with_hasher(ConstBuildHasher), ops)?;
    }
}
