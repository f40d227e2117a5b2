//! Semi-space copying.
//!
//! The heap is split at the midpoint. A collection flips the frontier to
//! the start of the idle half, evacuates every live object into it in
//! ascending location order, and leaves a forwarding record at each
//! source. Fixup then chases the forwarding records from every handle and
//! every reference slot; because each move left a breadcrumb, resolution
//! order does not matter. The abandoned half is logged as one freed block.

use log::trace;

use crate::collectors::Collector;
use crate::heap::HeapState;
use crate::{Loc, HEAP_SEMI_SIZE};

pub(crate) struct Copying;

impl Collector for Copying {
    fn collect(&mut self, heap: &mut HeapState) {
        self.evacuate(heap);
        heap.fixup_references();
        if heap.top as usize >= HEAP_SEMI_SIZE {
            heap.log_region_freed(1, (HEAP_SEMI_SIZE - 1) as u16);
        } else {
            heap.log_region_freed(HEAP_SEMI_SIZE as Loc, HEAP_SEMI_SIZE as u16);
        }
    }
}

impl Copying {
    fn evacuate(&self, heap: &mut HeapState) {
        heap.mark_live();
        // Nil sits at location 0 and never moves; the frontier flips to
        // whichever half is idle.
        heap.top = if heap.top as usize >= HEAP_SEMI_SIZE {
            1
        } else {
            HEAP_SEMI_SIZE as Loc
        };
        trace!("flip: frontier now {}", heap.top);
        let live: Vec<Loc> = heap.live.iter().copied().collect();
        for from in live {
            heap.move_obj(from);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::heap::{Heap, HeapConfig};
    use crate::trace::{EventBuffer, TraceEvent};
    use crate::{Algorithm, NumRef, TupRef, HEAP_SEMI_SIZE};

    fn heap_with_events() -> (Heap, EventBuffer) {
        let events = EventBuffer::new();
        let heap = Heap::new(
            HeapConfig::new(Algorithm::Copying).sink(Box::new(events.clone())),
        );
        (heap, events)
    }

    #[test]
    fn collection_flips_the_active_half() {
        let (heap, events) = heap_with_events();
        let keep = NumRef::new(&heap, 7);
        while heap.top() < (HEAP_SEMI_SIZE / 2) as u16 {
            drop(NumRef::new(&heap, 0));
        }
        assert!((keep.loc() as usize) < HEAP_SEMI_SIZE);

        heap.start_trace();
        heap.gc();

        assert!(heap.top() as usize >= HEAP_SEMI_SIZE);
        assert!(keep.loc() as usize >= HEAP_SEMI_SIZE);
        assert_eq!(keep.to_int(), 7);
        let frees: Vec<_> = events
            .take_all()
            .into_iter()
            .filter(|e| matches!(e, TraceEvent::Free { .. }))
            .collect();
        assert_eq!(
            frees,
            vec![TraceEvent::Free {
                loc: 1,
                size: (HEAP_SEMI_SIZE - 1) as u16
            }],
            "the old half is reclaimed as one block"
        );
    }

    #[test]
    fn a_second_flip_brings_the_graph_back_intact() {
        let (heap, _events) = heap_with_events();
        let t = TupRef::new(&heap, 2);
        let a = NumRef::new(&heap, 1);
        t.set(0, &a);
        t.set(1, &a);
        let footprint = |heap: &Heap| heap.cells().iter().map(|c| c.size).sum::<u16>();

        heap.gc();
        let once = footprint(&heap);
        let rendered = t.render();
        heap.gc();
        assert_eq!(footprint(&heap), once);
        assert_eq!(t.render(), rendered);
        assert!((t.loc() as usize) < HEAP_SEMI_SIZE, "back in the low half");
    }

    #[test]
    fn no_forwarding_records_survive_fixup() {
        let (heap, _events) = heap_with_events();
        let t = TupRef::new(&heap, 2);
        let a = NumRef::new(&heap, 4);
        t.set(0, &a);
        heap.gc();
        for cell in heap.cells() {
            assert_ne!(cell.tag, crate::TypeTag::Forward);
        }
        assert_eq!(t.get(0).to_int(), 4);
    }

    #[test]
    fn shared_objects_are_copied_once() {
        let (heap, _events) = heap_with_events();
        let t = TupRef::new(&heap, 2);
        let shared = NumRef::new(&heap, 3);
        t.set(0, &shared);
        t.set(1, &shared);
        heap.gc();
        let h = heap.state().borrow();
        let t_loc = t.loc();
        assert_eq!(h.word(t_loc + 2), h.word(t_loc + 3), "both slots agree");
    }
}
