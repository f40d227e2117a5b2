//! Reference counting.
//!
//! There is no tracing phase: ownership is settled at every store.
//! Allocation starts an object at one owner, sharing adds one, releasing
//! removes one, and the object dies the instant its count reaches zero,
//! cascading through its outgoing references. Cycles are never reclaimed;
//! that is the accepted cost of the scheme and half the point of
//! demonstrating it.
//!
//! Under the three tracing algorithms every operation here degenerates to
//! a no-op and counts stay at zero.

use crate::collectors::Algorithm;
use crate::heap::HeapState;
use crate::Loc;

impl HeapState {
    /// A freshly allocated object has exactly one owner: the handle that
    /// made it.
    pub(crate) fn init_ref_count(&mut self, loc: Loc) {
        if self.algorithm == Algorithm::RefCount {
            self.set_count_raw(loc, 1);
            self.tracer.ref_count(loc, 1);
        } else {
            self.set_count_raw(loc, 0);
        }
    }

    pub(crate) fn inc_ref_count(&mut self, loc: Loc) {
        if self.algorithm != Algorithm::RefCount {
            return;
        }
        let count = self.ref_count_at(loc).wrapping_add(1);
        self.set_count_raw(loc, count);
        self.tracer.ref_count(loc, count as u16);
    }

    /// Drops one owner. Returns true when the object just died and its
    /// cell is ready to be freed; the outgoing references have already
    /// been released by then.
    pub(crate) fn dec_ref_count(&mut self, loc: Loc) -> bool {
        if self.algorithm != Algorithm::RefCount {
            return false;
        }
        let count = self.ref_count_at(loc).wrapping_sub(1);
        self.set_count_raw(loc, count);
        self.tracer.ref_count(loc, count as u16);
        if count == 0 {
            self.cleanup(loc);
            true
        } else {
            false
        }
    }

    /// Releases one reference held in a heap slot, freeing in place when
    /// it was the last. A zero slot holds nothing.
    pub(crate) fn unshare(&mut self, loc: Loc) {
        if loc != 0 && self.dec_ref_count(loc) {
            let size = self.obj_size(loc);
            self.free(loc, size);
        }
    }
}
