#![cfg_attr(docsrs, doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]
//! An array-backed binary heap with stable handles for _O_(log _n_) removal
//! of arbitrary elements.
//!
//! See the documentation for the [`Heap`] and [`Slot`] types for details.

extern crate alloc;

use alloc::vec::Vec;
use core::{cmp::Ordering, fmt};

#[cfg(test)]
mod tests;

/// An array-backed binary heap.
///
/// A `Heap` keeps its elements partially ordered by a comparison function, so
/// that the element which compares *least* is always at the front. It allows
/// the user to select the ordering:
///
/// * Consider using [`Heap::new_min()`] if you want the **smallest** element
///   at the front.
/// * Consider using [`Heap::new_max()`] if you want the **largest** element
///   at the front.
/// * If `T` does NOT implement [`Ord`], or you want a custom ordering anyway,
///   consider using [`Heap::new_with_cmp()`].
///
/// # Slots
///
/// Unlike [`alloc::collections::BinaryHeap`], every element pushed into a
/// `Heap` is tracked by a [`Slot`], which is returned from [`Heap::push`]. The
/// heap records each element's current position in its slot whenever a sift
/// moves it, so [`Heap::remove`] can take an element out of the middle of the
/// heap without searching for it.
///
/// # Ties
///
/// Elements that compare equal come out in an unspecified order. The heap is
/// not stable, and does not promise FIFO ordering among equal elements. If
/// insertion order matters, fold a sequence number into the comparison.
pub struct Heap<T> {
    entries: Vec<Entry<T>>,
    slots: Vec<SlotState>,
    /// Indices into `slots` whose elements have left the heap.
    vacant: Vec<usize>,
    // Returns if LHS is less/same/greater than RHS
    cmp: fn(&T, &T) -> Ordering,
}

/// A handle to an element in a [`Heap`].
///
/// A `Slot` is returned by [`Heap::push`] and stays valid for as long as the
/// element it was returned for remains in the heap. Once that element is
/// popped or removed, the slot goes stale: [`Heap::get`], [`Heap::contains`],
/// and [`Heap::remove`] will all report a miss for it, even if the heap has
/// since reused the slot's storage for a different element.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot {
    index: usize,
    generation: u32,
}

struct Entry<T> {
    value: T,
    slot: usize,
}

#[derive(Debug)]
struct SlotState {
    /// The element's current index in `entries`, if it is in the heap.
    position: Option<usize>,
    generation: u32,
}

#[inline]
fn invert_sort<T: Ord>(a: &T, b: &T) -> Ordering {
    // Inverted sort order!
    T::cmp(b, a)
}

// === impl Heap ===

impl<T: Ord> Heap<T> {
    /// Returns a new, empty heap with the **smallest** element at the front.
    ///
    /// * Consider using [`Heap::new_max()`] if you want the **largest**
    ///   element at the front.
    /// * Consider using [`Heap::new_with_cmp()`] if you want to provide your
    ///   own ordering.
    #[must_use]
    pub const fn new_min() -> Self {
        Self::new_with_cmp(T::cmp)
    }

    /// Returns a new, empty heap with the **largest** element at the front.
    #[must_use]
    pub const fn new_max() -> Self {
        Self::new_with_cmp(invert_sort::<T>)
    }
}

impl<T> Heap<T> {
    /// Returns a new, empty heap ordered by the provided comparison function.
    ///
    /// The element for which `cmp` returns [`Ordering::Less`] against every
    /// other element is kept at the front of the heap.
    #[must_use]
    pub const fn new_with_cmp(cmp: fn(&T, &T) -> Ordering) -> Self {
        Self {
            entries: Vec::new(),
            slots: Vec::new(),
            vacant: Vec::new(),
            cmp,
        }
    }

    /// Reserves capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
        self.slots.reserve(additional.saturating_sub(self.vacant.len()));
    }

    /// Returns the number of elements in the heap.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the heap contains no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pushes `value` into the heap, returning a [`Slot`] that tracks it.
    ///
    /// This is an _O_(log _n_) operation.
    pub fn push(&mut self, value: T) -> Slot {
        let slot = self.alloc_slot();
        let pos = self.entries.len();
        self.entries.push(Entry {
            value,
            slot: slot.index,
        });
        self.slots[slot.index].position = Some(pos);
        self.sift_up(pos);
        slot
    }

    /// Removes the front element of the heap and returns it, or [`None`] if
    /// the heap is empty.
    ///
    /// This is an _O_(log _n_) operation.
    pub fn pop(&mut self) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Borrows the front element of the heap, or returns [`None`] if the heap
    /// is empty.
    ///
    /// This is an _O_(1) operation.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.entries.first().map(|entry| &entry.value)
    }

    /// Borrows the element of the given `rank`, where rank 1 is the front of
    /// the heap, rank 2 is the element that would be popped after it, and so
    /// on.
    ///
    /// Returns [`None`] if `rank` is zero or greater than [`Heap::len`].
    ///
    /// Rank 1 is the same as [`Heap::peek`] and is _O_(1). Any other rank
    /// requires a selection over the whole heap, and is _O_(_n_); it is
    /// intended for diagnostics rather than hot paths.
    #[must_use]
    pub fn peek_nth(&self, rank: usize) -> Option<&T> {
        match rank {
            0 => None,
            1 => self.peek(),
            rank if rank > self.len() => None,
            rank => {
                let mut values = self.iter().collect::<Vec<_>>();
                let cmp = self.cmp;
                let (_, nth, _) = values.select_nth_unstable_by(rank - 1, |a, b| cmp(a, b));
                Some(*nth)
            }
        }
    }

    /// Borrows the element tracked by `slot`, if it is still in the heap.
    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&T> {
        let pos = self.position(slot)?;
        Some(&self.entries[pos].value)
    }

    /// Returns `true` if the element tracked by `slot` is still in the heap.
    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.position(slot).is_some()
    }

    /// Removes the element tracked by `slot` from wherever it currently is in
    /// the heap, and returns it.
    ///
    /// Returns [`None`] if `slot` is stale, i.e. the element it was returned
    /// for has already been popped or removed, or if `slot` was returned by a
    /// different heap.
    ///
    /// This is an _O_(log _n_) operation.
    pub fn remove(&mut self, slot: Slot) -> Option<T> {
        let pos = self.position(slot)?;
        Some(self.remove_at(pos))
    }

    /// Returns an iterator over the elements in the heap, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|entry| &entry.value)
    }

    /// Removes every element from the heap, invalidating all outstanding
    /// [`Slot`]s.
    pub fn clear(&mut self) {
        let Self {
            entries,
            slots,
            vacant,
            ..
        } = self;
        for entry in entries.drain(..) {
            release(slots, vacant, entry.slot);
        }
    }

    fn alloc_slot(&mut self) -> Slot {
        if let Some(index) = self.vacant.pop() {
            let generation = self.slots[index].generation;
            return Slot { index, generation };
        }

        let index = self.slots.len();
        self.slots.push(SlotState {
            position: None,
            generation: 0,
        });
        Slot {
            index,
            generation: 0,
        }
    }

    fn position(&self, slot: Slot) -> Option<usize> {
        let state = self.slots.get(slot.index)?;
        if state.generation != slot.generation {
            return None;
        }
        state.position
    }

    fn remove_at(&mut self, pos: usize) -> T {
        let entry = self.entries.swap_remove(pos);
        if pos < self.entries.len() {
            // the last element now sits at `pos`; it may need to move in
            // either direction.
            let moved = self.entries[pos].slot;
            self.slots[moved].position = Some(pos);
            if self.sift_up(pos) == pos {
                self.sift_down(pos);
            }
        }
        release(&mut self.slots, &mut self.vacant, entry.slot);
        entry.value
    }

    /// Returns the element's final position.
    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.less(pos, parent) {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if self.less(child, pos) {
                self.swap(child, pos);
                pos = child;
            } else {
                break;
            }
        }
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        (self.cmp)(&self.entries[a].value, &self.entries[b].value) == Ordering::Less
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.slots[self.entries[a].slot].position = Some(a);
        self.slots[self.entries[b].slot].position = Some(b);
    }

    /// Asserts that the heap ordering and the slot back-pointers agree.
    #[cfg(test)]
    #[track_caller]
    pub(crate) fn assert_valid(&self) {
        for (pos, entry) in self.entries.iter().enumerate() {
            if pos > 0 {
                let parent = (pos - 1) / 2;
                assert!(
                    !self.less(pos, parent),
                    "entry at {pos} sorts before its parent at {parent}"
                );
            }
            assert_eq!(
                self.slots[entry.slot].position,
                Some(pos),
                "slot {} does not point back at position {pos}",
                entry.slot,
            );
        }
        let occupied = self
            .slots
            .iter()
            .filter(|state| state.position.is_some())
            .count();
        assert_eq!(occupied, self.entries.len(), "occupied slots != len");
        for &index in &self.vacant {
            assert_eq!(
                self.slots[index].position, None,
                "vacant slot {index} still has a position"
            );
        }
    }
}

fn release(slots: &mut [SlotState], vacant: &mut Vec<usize>, index: usize) {
    let state = &mut slots[index];
    state.position = None;
    state.generation = state.generation.wrapping_add(1);
    vacant.push(index);
}

impl<T: Ord> Default for Heap<T> {
    fn default() -> Self {
        Self::new_min()
    }
}

impl<T: fmt::Debug> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            entries,
            slots,
            vacant,
            cmp: _,
        } = self;
        f.debug_struct("Heap")
            .field("len", &entries.len())
            .field("entries", &entries)
            .field("slots", &slots.len())
            .field("vacant", &vacant.len())
            .finish()
    }
}

impl<T: fmt::Debug> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("value", &self.value)
            .field("slot", &self.slot)
            .finish()
    }
}
