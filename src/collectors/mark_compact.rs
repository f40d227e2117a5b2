//! Mark-compact: the stable slide.
//!
//! One region, no copy reserve. After marking, the heap is walked in
//! address order. The first dead cell rewinds the frontier; from then on
//! every live cell is slid down onto it, without forwarding records —
//! a later slide may overwrite the source cell, so old-to-new mappings go
//! into a side table instead. Surviving objects keep their relative
//! order, and only the reclaimed tail is logged freed.

use log::trace;

use crate::collectors::Collector;
use crate::heap::HeapState;
use crate::Loc;

pub(crate) struct MarkCompact;

impl Collector for MarkCompact {
    fn collect(&mut self, heap: &mut HeapState) {
        let old_top = heap.top;
        self.compact(heap);
        if old_top > heap.top {
            heap.fixup_references();
            heap.log_region_freed(heap.top, old_top - heap.top);
        }
    }
}

impl MarkCompact {
    fn compact(&self, heap: &mut HeapState) {
        heap.forwarding.clear();
        heap.mark_live();
        let old_top = heap.top;
        let mut from: Loc = 1;
        while from < old_top {
            let size = heap.obj_size(from);
            if heap.live.contains(&from) {
                // Until the first gap appears the frontier has not moved
                // and live cells stay put.
                if old_top != heap.top {
                    let to = heap.move_sliding(from, size);
                    trace!("slide {} -> {}", from, to);
                    heap.forwarding.insert(from, to);
                }
            } else if old_top == heap.top {
                heap.top = from;
            }
            from += size;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::heap::{Heap, HeapConfig};
    use crate::{Algorithm, NumRef, StrRef, TupRef};

    fn heap() -> Heap {
        Heap::new(HeapConfig::new(Algorithm::MarkCompact))
    }

    #[test]
    fn the_slide_is_stable_and_fills_the_first_gap() {
        let heap = heap();
        let a = NumRef::new(&heap, 1);
        let b = NumRef::new(&heap, 2);
        let c = NumRef::new(&heap, 3);
        let (p_a, p_b, p_c) = (a.loc(), b.loc(), c.loc());
        assert!(p_a < p_b && p_b < p_c);
        drop(b);

        heap.gc();

        assert_eq!(a.loc(), p_a, "cells before the gap do not move");
        assert_eq!(c.loc(), p_a + a.size());
        assert_eq!(heap.top(), c.loc() + c.size());
        assert_eq!(heap.forwarding(), vec![(p_c, c.loc())]);
        assert_eq!(c.to_int(), 3);
    }

    #[test]
    fn relative_order_survives_compaction() {
        let heap = heap();
        let keep: Vec<StrRef> = ["one", "two", "three", "four"]
            .iter()
            .map(|s| StrRef::new(&heap, s))
            .collect();
        for gap in [NumRef::new(&heap, 0), NumRef::new(&heap, 0)] {
            drop(gap);
        }
        let before: Vec<_> = keep.iter().map(|s| s.text()).collect();
        heap.gc();
        let order: Vec<_> = keep.iter().map(|s| s.loc()).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted, "survivors keep their address order");
        let after: Vec<_> = keep.iter().map(|s| s.text()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn a_fully_live_heap_does_not_move() {
        let heap = heap();
        let a = NumRef::new(&heap, 1);
        let b = NumRef::new(&heap, 2);
        let (p_a, p_b, top) = (a.loc(), b.loc(), heap.top());
        heap.gc();
        assert_eq!((a.loc(), b.loc(), heap.top()), (p_a, p_b, top));
        assert!(heap.forwarding().is_empty());
    }

    #[test]
    fn references_are_rewritten_through_the_side_table() {
        let heap = heap();
        let dead = NumRef::new(&heap, 0);
        let t = TupRef::new(&heap, 1);
        let n = NumRef::new(&heap, 8);
        t.set(0, &n);
        drop(dead);
        heap.gc();
        assert_eq!(t.get(0).loc(), n.loc(), "slot and handle agree after fixup");
        assert_eq!(t.get(0).to_int(), 8);
    }

    #[test]
    fn compacting_twice_is_compacting_once() {
        let heap = heap();
        let _keep = TupRef::new(&heap, 3);
        drop(NumRef::new(&heap, 9));
        heap.gc();
        let first = (heap.top(), heap.cells());
        heap.gc();
        assert_eq!((heap.top(), heap.cells()), first);
    }
}
