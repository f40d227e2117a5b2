//! The heap array, the bump allocator, and the workbench façade handed to
//! clients.
//!
//! All state is single-threaded and single-owner: the words, the
//! allocation frontier, the root set, the forwarding table, the live set,
//! and the instrumentation clock live in one [`HeapState`] behind a shared
//! cell. Handles keep the state alive; nothing here locks.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::trace;

use crate::collectors::Algorithm;
use crate::handle::RootSet;
use crate::object::TypeTag;
use crate::trace::{TraceSink, Tracer};
use crate::{Loc, Word, HEAP_SEMI_SIZE, HEAP_SIZE};

pub(crate) struct HeapState {
    words: [Word; HEAP_SIZE],
    pub(crate) top: Loc,
    pub(crate) algorithm: Algorithm,
    pub(crate) forwarding: BTreeMap<Loc, Loc>,
    pub(crate) live: BTreeSet<Loc>,
    pub(crate) roots: RootSet,
    pub(crate) tracer: Tracer,
    pub(crate) freed: usize,
}

impl HeapState {
    pub(crate) fn word(&self, loc: Loc) -> Word {
        self.words[loc as usize]
    }

    pub(crate) fn set_word(&mut self, loc: Loc, w: Word) {
        self.words[loc as usize] = w;
    }

    /// End of the region the bump pointer may grow into: one semi-space
    /// under the copying collector, the whole heap otherwise.
    fn region_limit(&self) -> usize {
        match self.algorithm {
            Algorithm::Copying if (self.top as usize) < HEAP_SEMI_SIZE => HEAP_SEMI_SIZE,
            _ => HEAP_SIZE,
        }
    }

    pub(crate) fn region_start(&self) -> Loc {
        if self.algorithm == Algorithm::Copying && self.top as usize >= HEAP_SEMI_SIZE {
            HEAP_SEMI_SIZE as Loc
        } else {
            1
        }
    }

    // TODO: reuse freed blocks instead of bumping past them; needs a
    // first-fit scan over Free headers and block coalescing.

    /// Claims `size` words at the frontier and traces the allocation.
    /// Filling the active region exactly succeeds; one more word aborts.
    pub(crate) fn reserve(&mut self, size: u16) -> Loc {
        let loc = self.reserve_overlapping(size);
        self.tracer.alloc(loc, size);
        loc
    }

    /// The silent variant used by the compaction slide, where the claimed
    /// run may overlap the cell it is about to receive.
    pub(crate) fn reserve_overlapping(&mut self, size: u16) -> Loc {
        let loc = self.top;
        let next = loc as usize + size as usize;
        assert!(
            next <= self.region_limit(),
            "heap exhausted: {} words requested at {}",
            size,
            loc
        );
        self.top = next as Loc;
        loc
    }

    /// Reserves and zeroes, for objects initialised field by field.
    pub(crate) fn alloc(&mut self, size: u16) -> Loc {
        let loc = self.reserve(size);
        for i in 0..size {
            self.set_word(loc + i, 0);
        }
        loc
    }

    /// Copies the object at `from` into a fresh run. A non-zero `new_size`
    /// reserves that many words, truncating or zero-filling as needed;
    /// this is how tuple backings grow.
    pub(crate) fn copy_obj(&mut self, from: Loc, new_size: u16) -> Loc {
        let size = self.obj_size(from);
        if new_size > 0 {
            let to = self.reserve(new_size);
            let min = new_size.min(size);
            for i in 0..min {
                let w = self.word(from + i);
                self.set_word(to + i, w);
            }
            for i in min..new_size {
                self.set_word(to + i, 0);
            }
            self.tracer.copy(to, from, min);
            to
        } else {
            let to = self.reserve(size);
            for i in 0..size {
                let w = self.word(from + i);
                self.set_word(to + i, w);
            }
            self.tracer.copy(to, from, size);
            to
        }
    }

    /// Evacuates `from` into the active region and leaves a forwarding
    /// record in its place, so later fixups can chase the move.
    pub(crate) fn move_obj(&mut self, from: Loc) -> Loc {
        let size = self.obj_size(from);
        let to = self.reserve(size);
        for i in 0..size {
            let w = self.word(from + i);
            self.set_word(to + i, w);
        }
        self.init_header(from, TypeTag::Forward);
        self.set_word(from + 1, to);
        self.tracer.copy(to, from, size);
        to
    }

    /// Slides `from` down to the frontier without a forwarding record; the
    /// source cell may be overwritten by the next slide, so forwarding is
    /// the caller's side table. The copy runs ascending, which is only
    /// safe while destination <= source.
    pub(crate) fn move_sliding(&mut self, from: Loc, size: u16) -> Loc {
        let to = self.reserve_overlapping(size);
        for i in 0..size {
            let w = self.word(from + i);
            self.set_word(to + i, w);
        }
        self.tracer.copy(to, from, size);
        to
    }

    /// Stamps a reclaimable run over `loc`. Blocks are not coalesced; a
    /// later collection reclaims space wholesale.
    pub(crate) fn free(&mut self, loc: Loc, size: u16) {
        self.init_header(loc, TypeTag::Free);
        self.set_word(loc + 1, size);
        self.freed += size as usize;
        self.tracer.free(loc, size);
    }

    /// Records a whole region reclaimed by a moving collector. Only the
    /// trace and the per-cell bookkeeping change; the words are garbage.
    pub(crate) fn log_region_freed(&mut self, loc: Loc, size: u16) {
        self.freed += size as usize;
        self.tracer.free(loc, size);
    }

    /// Every location interpretation funnels through here so an
    /// incremental design can interpose. Currently the identity.
    pub(crate) fn read_barrier(&self, loc: Loc) -> Loc {
        loc
    }

    /// Emits a breakpoint record followed by snapshots of the root set and
    /// the live closure.
    pub(crate) fn breakpoint(&mut self, message: &str) {
        self.tracer.breakpoint(message);
        let roots: Vec<Loc> = self.roots.iter().collect();
        self.live.clear();
        for &loc in &roots {
            if loc != 0 {
                self.live.insert(loc);
            }
            self.traverse(loc, &mut |h, l| {
                h.live.insert(l);
            });
        }
        self.tracer.roots(roots);
        let live: Vec<Loc> = self.live.iter().copied().collect();
        self.tracer.live(live);
    }
}

/// Construction-time options for a [`Heap`].
pub struct HeapConfig {
    algorithm: Algorithm,
    sinks: Vec<Box<dyn TraceSink>>,
}

impl HeapConfig {
    pub fn new(algorithm: Algorithm) -> HeapConfig {
        HeapConfig {
            algorithm,
            sinks: Vec::new(),
        }
    }

    /// Attaches a trace sink; sinks receive every event in order.
    pub fn sink(mut self, sink: Box<dyn TraceSink>) -> HeapConfig {
        self.sinks.push(sink);
        self
    }
}

/// One cell of a heap walk, as reported by [`Heap::cells`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapCell {
    pub loc: Loc,
    pub tag: TypeTag,
    pub size: u16,
    pub ref_count: u8,
}

/// The workbench: a managed heap plus one collector algorithm. Cloning
/// yields another handle to the same heap.
#[derive(Clone)]
pub struct Heap {
    state: Rc<RefCell<HeapState>>,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Heap {
        let mut state = HeapState {
            words: [0; HEAP_SIZE],
            top: 1, // location 0 is the nil singleton
            algorithm: config.algorithm,
            forwarding: BTreeMap::new(),
            live: BTreeSet::new(),
            roots: RootSet::new(),
            tracer: Tracer::new(config.sinks),
            freed: 0,
        };
        state.tracer.alloc(0, 1);
        if state.algorithm == Algorithm::RefCount {
            // Stands in for the permanent nil reference: transient shares
            // of nil can never drag its count to zero.
            state.set_count_raw(0, 1);
        }
        trace!("heap ready: {:?}, {} words", state.algorithm, HEAP_SIZE);
        Heap {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<HeapState>> {
        &self.state
    }

    pub fn algorithm(&self) -> Algorithm {
        self.state.borrow().algorithm
    }

    /// Current allocation frontier: one past the last reserved word.
    pub fn top(&self) -> Loc {
        self.state.borrow().top
    }

    /// Runs the configured collector. Under reference counting this is a
    /// no-op; reclamation there happens as counts reach zero.
    pub fn gc(&self) {
        self.state.borrow_mut().gc();
    }

    pub fn start_trace(&self) {
        self.state.borrow_mut().tracer.start();
    }

    pub fn stop_trace(&self) {
        self.state.borrow_mut().tracer.stop();
    }

    /// Marks a labelled point in the trace and snapshots roots and the
    /// live closure.
    pub fn breakpoint(&self, message: &str) {
        self.state.borrow_mut().breakpoint(message);
    }

    /// Walks the active region cell by cell. The walk is a partition:
    /// consecutive cells are adjacent, with Free records filling the gaps.
    pub fn cells(&self) -> Vec<HeapCell> {
        let h = self.state.borrow();
        let mut out = Vec::new();
        let mut loc = h.region_start();
        while loc < h.top {
            let tag = h.tag_at(loc);
            let size = h.obj_size(loc);
            out.push(HeapCell {
                loc,
                tag,
                size,
                ref_count: h.ref_count_at(loc),
            });
            loc += size;
        }
        out
    }

    /// The side forwarding table left by the last mark-compact slide.
    pub fn forwarding(&self) -> Vec<(Loc, Loc)> {
        let h = self.state.borrow();
        h.forwarding.iter().map(|(&k, &v)| (k, v)).collect()
    }
}
