//! The pluggable collection algorithms.
//!
//! All four share one object model and one allocator surface. The tracing
//! three also share the root-set walk implemented here: every handle in
//! the root set seeds the live set, and traversal closes it transitively.

pub mod copying;
pub mod mark_compact;
pub mod mark_sweep;
pub mod ref_count;

use std::time::Instant;

use log::debug;

use crate::heap::HeapState;
use crate::object::TypeTag;
use crate::Loc;

use copying::Copying;
use mark_compact::MarkCompact;
use mark_sweep::MarkSweep;

/// Which reclamation strategy a heap runs. Picked once per heap; the demo
/// binary fixes it at build time through cargo features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    RefCount,
    MarkSweep,
    Copying,
    MarkCompact,
}

/// One collection cycle over the whole heap.
pub(crate) trait Collector {
    fn collect(&mut self, heap: &mut HeapState);
}

impl HeapState {
    /// Runs the configured collector to completion. Reference counting
    /// reclaims eagerly as counts fall, so a requested cycle is a no-op.
    pub(crate) fn gc(&mut self) {
        self.freed = 0;
        let start = Instant::now();
        match self.algorithm {
            Algorithm::RefCount => {
                debug!("gc requested under ref-counting; nothing to trace");
                return;
            }
            Algorithm::MarkSweep => MarkSweep.collect(self),
            Algorithm::Copying => Copying.collect(self),
            Algorithm::MarkCompact => MarkCompact.collect(self),
        }
        debug!(
            "{:?} cycle: reclaimed {} words in {:?}",
            self.algorithm,
            self.freed,
            start.elapsed()
        );
    }

    /// Adds one location to the live set. Marking shows up in the trace as
    /// a reference-count pulse, except under copying where the moves
    /// themselves tell the story.
    pub(crate) fn mark_live_loc(&mut self, loc: Loc) {
        if loc != 0 {
            if self.algorithm != Algorithm::Copying {
                self.tracer.ref_count(loc, 1);
            }
            self.live.insert(loc);
        }
    }

    /// Rebuilds the live set from the root set: every handle's location
    /// plus everything transitively reachable from it.
    pub(crate) fn mark_live(&mut self) {
        self.live.clear();
        let roots: Vec<Loc> = self.roots.iter().collect();
        debug!("marking from {} root(s)", roots.len());
        for loc in roots {
            self.mark_live_loc(loc);
            self.traverse(loc, &mut |h, l| h.mark_live_loc(l));
        }
    }

    /// Where `loc` lives after the last round of moves: the forwarding
    /// record it points at (copying) or the side table entry (compact),
    /// identity when it never moved.
    pub(crate) fn loc_after_move(&self, loc: Loc) -> Loc {
        match self.algorithm {
            Algorithm::Copying => {
                if self.tag_at(loc) == TypeTag::Forward {
                    self.word(loc + 1)
                } else {
                    loc
                }
            }
            _ => self.forwarding.get(&loc).copied().unwrap_or(loc),
        }
    }

    /// Rewrites every handle and every reference slot of every live object
    /// to its post-move location. Moves leave resolvable breadcrumbs, so
    /// the order of resolution does not matter.
    pub(crate) fn fixup_references(&mut self) {
        for slot in self.roots.occupied_slots() {
            let loc = self.roots.get(slot);
            let moved = self.loc_after_move(loc);
            self.roots.set(slot, moved);
        }
        let mut loc = self.region_start();
        while loc < self.top {
            let size = self.obj_size(loc);
            self.fixup_object(loc);
            loc += size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapConfig};
    use crate::{NumRef, TupRef};

    #[test]
    fn mark_live_closes_over_the_root_set() {
        let heap = Heap::new(HeapConfig::new(Algorithm::MarkSweep));
        let t = TupRef::new(&heap, 2);
        let a = NumRef::new(&heap, 1);
        t.set(0, &a);
        let hidden = {
            let b = NumRef::new(&heap, 2);
            t.set(1, &b);
            b.loc()
        };
        let stray = NumRef::new(&heap, 3);
        let stray_loc = stray.loc();
        drop(stray);

        let (t_loc, a_loc) = (t.loc(), a.loc());
        let mut h = heap.state().borrow_mut();
        h.mark_live();
        assert!(h.live.contains(&t_loc));
        assert!(h.live.contains(&a_loc));
        assert!(h.live.contains(&hidden), "slot references stay live");
        assert!(!h.live.contains(&stray_loc), "dropped roots do not");
    }

    #[test]
    fn loc_after_move_is_identity_without_moves() {
        let heap = Heap::new(HeapConfig::new(Algorithm::MarkSweep));
        let a = NumRef::new(&heap, 1);
        let h = heap.state().borrow();
        assert_eq!(h.loc_after_move(a.loc()), a.loc());
        assert_eq!(h.loc_after_move(0), 0);
    }
}
