use super::*;
use proptest::{collection::vec, prelude::*};
use std::collections::BTreeMap;

fn drain<T>(heap: &mut Heap<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(heap.len());
    while let Some(value) = heap.pop() {
        heap.assert_valid();
        out.push(value);
    }
    out
}

#[test]
fn pops_in_order() {
    let mut heap = Heap::new_min();
    for value in [5, 3, 9, 1, 7, 3, 8] {
        heap.push(value);
        heap.assert_valid();
    }
    assert_eq!(heap.len(), 7);
    assert_eq!(heap.peek(), Some(&1));
    assert_eq!(drain(&mut heap), vec![1, 3, 3, 5, 7, 8, 9]);
    assert!(heap.is_empty());
    assert_eq!(heap.pop(), None);
}

#[test]
fn max_heap() {
    let mut heap = Heap::new_max();
    for value in [5, 3, 9, 1] {
        heap.push(value);
    }
    assert_eq!(drain(&mut heap), vec![9, 5, 3, 1]);
}

#[test]
fn custom_cmp() {
    // order by the second field only
    let mut heap = Heap::new_with_cmp(|a: &(char, u32), b: &(char, u32)| a.1.cmp(&b.1));
    heap.push(('a', 3));
    heap.push(('b', 1));
    heap.push(('c', 2));
    let order = drain(&mut heap).into_iter().map(|(c, _)| c).collect::<String>();
    assert_eq!(order, "bca");
}

#[test]
fn remove_from_middle() {
    let mut heap = Heap::new_min();
    let slots = (0..10).map(|i| heap.push(i * 10)).collect::<Vec<_>>();

    assert_eq!(heap.remove(slots[4]), Some(40));
    heap.assert_valid();
    assert_eq!(heap.remove(slots[0]), Some(0));
    heap.assert_valid();
    assert_eq!(heap.remove(slots[9]), Some(90));
    heap.assert_valid();

    assert_eq!(drain(&mut heap), vec![10, 20, 30, 50, 60, 70, 80]);
}

#[test]
fn stale_slots_miss() {
    let mut heap = Heap::new_min();
    let a = heap.push(1);
    let b = heap.push(2);

    assert_eq!(heap.pop(), Some(1));
    assert!(!heap.contains(a), "popped element's slot must go stale");
    assert_eq!(heap.get(a), None);
    assert_eq!(heap.remove(a), None);

    assert_eq!(heap.get(b), Some(&2));
    assert_eq!(heap.remove(b), Some(2));
    assert_eq!(heap.remove(b), None, "double removal must miss");
    heap.assert_valid();
}

#[test]
fn reused_storage_does_not_revive_slot() {
    let mut heap = Heap::new_min();
    let old = heap.push(1);
    assert_eq!(heap.remove(old), Some(1));

    // the new element reuses the old slot's storage...
    let new = heap.push(2);
    assert_ne!(old, new);
    // ...but the old handle must not reach it.
    assert_eq!(heap.get(old), None);
    assert_eq!(heap.remove(old), None);
    assert_eq!(heap.get(new), Some(&2));
}

#[test]
fn clear_invalidates_slots() {
    let mut heap = Heap::new_min();
    let slots = (0..4).map(|i| heap.push(i)).collect::<Vec<_>>();
    heap.clear();
    assert!(heap.is_empty());
    heap.assert_valid();

    let fresh = heap.push(100);
    for slot in slots {
        assert_eq!(heap.get(slot), None);
    }
    assert_eq!(heap.get(fresh), Some(&100));
}

#[test]
fn peek_nth_ranks() {
    let mut heap = Heap::new_min();
    for value in [40, 10, 30, 20, 50] {
        heap.push(value);
    }
    assert_eq!(heap.peek_nth(0), None);
    assert_eq!(heap.peek_nth(1), Some(&10));
    assert_eq!(heap.peek_nth(2), Some(&20));
    assert_eq!(heap.peek_nth(3), Some(&30));
    assert_eq!(heap.peek_nth(5), Some(&50));
    assert_eq!(heap.peek_nth(6), None);
}

#[derive(Debug, Clone)]
enum Op {
    Push(u16),
    Pop,
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u16>().prop_map(Op::Push),
        1 => Just(Op::Pop),
        2 => any::<usize>().prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn drains_sorted(values in vec(any::<i32>(), 0..128)) {
        let mut heap = Heap::new_min();
        for &value in &values {
            heap.push(value);
        }
        let mut expected = values;
        expected.sort_unstable();
        prop_assert_eq!(drain(&mut heap), expected);
    }

    #[test]
    fn matches_model(ops in vec(op(), 0..256)) {
        // the model is a multiset of values plus the live slots we handed out.
        let mut heap = Heap::new_min();
        let mut model = BTreeMap::<u16, usize>::new();
        let mut live = Vec::<(Slot, u16)>::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    let slot = heap.push(value);
                    *model.entry(value).or_default() += 1;
                    live.push((slot, value));
                }
                Op::Pop => {
                    let expected = model.keys().next().copied();
                    let popped = heap.pop();
                    prop_assert_eq!(popped, expected);
                    if let Some(value) = popped {
                        remove_one(&mut model, value);
                        // some live slot for this value went stale; drop
                        // whichever one the heap no longer has.
                        live.retain(|(slot, _)| heap.contains(*slot));
                    }
                }
                Op::Remove(index) if !live.is_empty() => {
                    let (slot, value) = live.swap_remove(index % live.len());
                    prop_assert_eq!(heap.remove(slot), Some(value));
                    prop_assert_eq!(heap.remove(slot), None);
                    remove_one(&mut model, value);
                }
                Op::Remove(_) => {}
            }
            heap.assert_valid();
            prop_assert_eq!(heap.len(), model.values().sum::<usize>());
            prop_assert_eq!(heap.peek().copied(), model.keys().next().copied());
        }
    }
}

fn remove_one(model: &mut BTreeMap<u16, usize>, value: u16) {
    if let Some(count) = model.get_mut(&value) {
        *count -= 1;
        if *count == 0 {
            model.remove(&value);
        }
    }
}
