//! Mark-and-sweep over a single region.
//!
//! Marking builds the live set from the roots; the sweep then walks the
//! heap linearly, cell by cell, stamping a Free record over everything
//! that was not reached. Nothing moves and the frontier stays put, so the
//! heap ends up striped with alternating live and free bands: the
//! fragmentation this algorithm is famous for, rendered in the trace.

use log::trace;

use crate::collectors::Collector;
use crate::heap::HeapState;
use crate::Loc;

pub(crate) struct MarkSweep;

impl Collector for MarkSweep {
    fn collect(&mut self, heap: &mut HeapState) {
        heap.mark_live();
        self.sweep(heap);
    }
}

impl MarkSweep {
    fn sweep(&self, heap: &mut HeapState) {
        let mut loc: Loc = 1;
        while loc < heap.top {
            let size = heap.obj_size(loc);
            if !heap.live.contains(&loc) {
                trace!("sweep {} ({} words)", loc, size);
                heap.free(loc, size);
            }
            loc += size;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::heap::{Heap, HeapConfig};
    use crate::object::TypeTag;
    use crate::{Algorithm, NumRef};

    #[test]
    fn unreachable_cells_become_free_bands_in_place() {
        let heap = Heap::new(HeapConfig::new(Algorithm::MarkSweep));
        let keep: Vec<NumRef> = (0..5).map(|i| NumRef::new(&heap, i)).collect();
        let locs: Vec<_> = keep.iter().map(|n| n.loc()).collect();
        let top_before = heap.top();

        // Drop the second and fourth; the survivors stay where they are.
        let mut keep = keep;
        keep.remove(3);
        keep.remove(1);
        heap.gc();

        assert_eq!(heap.top(), top_before, "sweep never moves the frontier");
        let cells = heap.cells();
        assert_eq!(cells.len(), 5);
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.loc, locs[i]);
            let expect = if i == 1 || i == 3 {
                TypeTag::Free
            } else {
                TypeTag::Num
            };
            assert_eq!(cell.tag, expect, "cell {}", i);
        }
    }

    #[test]
    fn a_second_sweep_changes_nothing() {
        let heap = Heap::new(HeapConfig::new(Algorithm::MarkSweep));
        let _keep = NumRef::new(&heap, 1);
        let dead = NumRef::new(&heap, 2);
        drop(dead);
        heap.gc();
        let first = (heap.top(), heap.cells());
        heap.gc();
        assert_eq!((heap.top(), heap.cells()), first);
    }
}
