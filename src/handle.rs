//! Handles: externally-held references that survive collections.
//!
//! A handle never moves; the location it holds may be rewritten by the
//! collector between any two observations. Every handle occupies a slot
//! in the heap's root set for exactly as long as it lives; `Drop` is the
//! guaranteed removal on every exit path.
//!
//! The cardinal rule of this module: no raw location may be kept across
//! an allocating call. Every operation re-reads its location from the
//! root slot after anything that could have triggered a move.

use std::fmt;
use std::ops::Deref;

use crate::heap::Heap;
use crate::object::{self, TypeTag};
use crate::Loc;

/// The root set: a slot stack with free-list reuse. Each live handle owns
/// one slot holding its current location.
pub(crate) struct RootSet {
    slots: Vec<Option<Loc>>,
    free: Vec<usize>,
}

impl RootSet {
    pub(crate) fn new() -> RootSet {
        RootSet {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, loc: Loc) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(loc);
                slot
            }
            None => {
                self.slots.push(Some(loc));
                self.slots.len() - 1
            }
        }
    }

    pub(crate) fn remove(&mut self, slot: usize) {
        self.slots[slot] = None;
        self.free.push(slot);
    }

    pub(crate) fn get(&self, slot: usize) -> Loc {
        self.slots[slot].expect("stale root slot")
    }

    pub(crate) fn set(&mut self, slot: usize, loc: Loc) {
        assert!(self.slots[slot].is_some(), "stale root slot");
        self.slots[slot] = Some(loc);
    }

    /// Locations of all live roots, in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Loc> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    pub(crate) fn occupied_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|_| i))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// An untyped handle to a heap object. Cloning shares (bumping the
/// reference count); dropping unroots and, under reference counting,
/// frees when the count reaches zero.
pub struct ObjRef {
    heap: Heap,
    slot: usize,
}

impl ObjRef {
    /// Alloc construction: a fresh zeroed object of `size` words.
    pub(crate) fn alloc(heap: &Heap, size: u16) -> ObjRef {
        let slot = {
            let mut h = heap.state().borrow_mut();
            let loc = h.alloc(size);
            h.init_ref_count(loc);
            h.roots.insert(loc)
        };
        ObjRef {
            heap: heap.clone(),
            slot,
        }
    }

    /// Copy construction: a fresh object initialised from `src`, at a
    /// possibly larger size.
    pub(crate) fn copy(heap: &Heap, src: Loc, new_size: u16) -> ObjRef {
        let slot = {
            let mut h = heap.state().borrow_mut();
            let loc = h.copy_obj(src, new_size);
            h.init_ref_count(loc);
            h.roots.insert(loc)
        };
        ObjRef {
            heap: heap.clone(),
            slot,
        }
    }

    /// Share construction: aliases an existing location.
    pub fn at(heap: &Heap, loc: Loc) -> ObjRef {
        let slot = {
            let mut h = heap.state().borrow_mut();
            let loc = h.read_barrier(loc);
            h.inc_ref_count(loc);
            h.roots.insert(loc)
        };
        ObjRef {
            heap: heap.clone(),
            slot,
        }
    }

    /// The location this handle currently holds. Valid only until the
    /// next potentially-moving operation.
    pub fn loc(&self) -> Loc {
        self.heap.state().borrow().roots.get(self.slot)
    }

    /// Bumps the referent's count and returns its location, refreshing the
    /// handle through the read barrier. Step one of every store.
    pub(crate) fn share(&self) -> Loc {
        let mut h = self.heap.state().borrow_mut();
        let loc = h.roots.get(self.slot);
        let loc = h.read_barrier(loc);
        h.roots.set(self.slot, loc);
        h.inc_ref_count(loc);
        loc
    }

    pub fn type_tag(&self) -> TypeTag {
        let h = self.heap.state().borrow();
        let loc = h.roots.get(self.slot);
        h.tag_at(loc)
    }

    pub fn size(&self) -> u16 {
        let h = self.heap.state().borrow();
        let loc = h.roots.get(self.slot);
        h.obj_size(loc)
    }

    pub fn to_int(&self) -> i16 {
        let mut h = self.heap.state().borrow_mut();
        let loc = h.roots.get(self.slot);
        h.obj_to_int(loc)
    }

    pub fn equals(&self, other: &ObjRef) -> bool {
        let h = self.heap.state().borrow();
        let a = h.roots.get(self.slot);
        let b = h.roots.get(other.slot);
        h.obj_equals(a, b)
    }

    /// Diagnostic rendering of the referent; does not touch the trace.
    pub fn render(&self) -> String {
        let h = self.heap.state().borrow();
        let loc = h.roots.get(self.slot);
        h.render_obj(loc)
    }
}

impl Clone for ObjRef {
    fn clone(&self) -> ObjRef {
        ObjRef::at(&self.heap, self.loc())
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        let mut h = self.heap.state().borrow_mut();
        let loc = h.roots.get(self.slot);
        h.roots.remove(self.slot);
        if h.dec_ref_count(loc) {
            let size = h.obj_size(loc);
            h.free(loc, size);
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({} -> {})", self.loc(), self.render())
    }
}

/// Handle to a signed number.
pub struct NumRef(ObjRef);

impl NumRef {
    pub fn new(heap: &Heap, val: i16) -> NumRef {
        let r = ObjRef::alloc(heap, object::NUM_SIZE);
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_num(loc, val);
        }
        NumRef(r)
    }

    pub fn set(&self, val: i16) {
        let mut h = self.0.heap.state().borrow_mut();
        let loc = h.roots.get(self.0.slot);
        h.num_set(loc, val);
    }
}

impl Deref for NumRef {
    type Target = ObjRef;
    fn deref(&self) -> &ObjRef {
        &self.0
    }
}

/// Handle to a fixed-length tuple of references.
pub struct TupRef(ObjRef);

impl TupRef {
    pub fn new(heap: &Heap, len: u16) -> TupRef {
        let r = ObjRef::alloc(heap, object::tup_size(len));
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_tup(loc, len);
        }
        TupRef(r)
    }

    /// A fresh tuple initialised from the one at `src`, usually larger;
    /// the copied slots keep their referents shared.
    pub(crate) fn copy_from(heap: &Heap, src: Loc, len: u16) -> TupRef {
        let r = ObjRef::copy(heap, src, object::tup_size(len));
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_tup(loc, len);
        }
        TupRef(r)
    }

    pub fn length(&self) -> u16 {
        let h = self.0.heap.state().borrow();
        let loc = h.roots.get(self.0.slot);
        h.word(loc + 1)
    }

    pub fn get(&self, i: u16) -> ObjRef {
        let val = {
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(self.0.slot);
            h.tup_get(loc, i)
        };
        ObjRef::at(&self.0.heap, val)
    }

    pub fn set(&self, i: u16, obj: &ObjRef) {
        // Share the incoming reference before releasing the outgoing one;
        // self-assignment must never see the count touch zero.
        let shared = obj.share();
        let mut h = self.0.heap.state().borrow_mut();
        let loc = h.roots.get(self.0.slot);
        h.tup_set(loc, i, shared);
    }
}

impl Deref for TupRef {
    type Target = ObjRef;
    fn deref(&self) -> &ObjRef {
        &self.0
    }
}

/// Handle to a growable vector backed by a tuple.
pub struct VecRef(ObjRef);

impl VecRef {
    pub fn new(heap: &Heap, capacity: u16) -> VecRef {
        let r = ObjRef::alloc(heap, object::VEC_SIZE);
        let backing = TupRef::new(heap, capacity);
        let tup = backing.share();
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_vec(loc, tup);
        }
        VecRef(r)
    }

    /// Reinterprets a generic handle known to reference a vector.
    pub fn from_obj(obj: ObjRef) -> VecRef {
        assert_eq!(obj.type_tag(), TypeTag::Vec, "not a vector");
        VecRef(obj)
    }

    pub fn length(&self) -> u16 {
        let h = self.0.heap.state().borrow();
        let loc = h.roots.get(self.0.slot);
        h.word(loc + 1)
    }

    pub fn get(&self, i: u16) -> ObjRef {
        let val = {
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(self.0.slot);
            h.vec_get(loc, i)
        };
        ObjRef::at(&self.0.heap, val)
    }

    /// Element `j` of the tuple or vector stored at index `i`.
    pub fn get_at(&self, i: u16, j: u16) -> ObjRef {
        let inner = self.get(i);
        let val = {
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(inner.slot);
            match h.tag_at(loc) {
                TypeTag::Tup => h.tup_get(loc, j),
                TypeTag::Vec => h.vec_get(loc, j),
                other => panic!("indexed into a {:?}", other),
            }
        };
        ObjRef::at(&self.0.heap, val)
    }

    pub fn set(&self, i: u16, obj: &ObjRef) {
        let tup = {
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(self.0.slot);
            let len = h.word(loc + 1);
            assert!(i < len, "vector index {} out of bounds (len {})", i, len);
            h.tracer.get(loc + 2);
            h.word(loc + 2)
        };
        let shared = obj.share();
        let mut h = self.0.heap.state().borrow_mut();
        h.tup_set(tup, i, shared);
    }

    /// Appends `obj`, doubling the backing tuple when full. The old
    /// backing must stay shared until the new one is installed: share
    /// new, unshare old, then overwrite the field.
    pub fn push(&self, obj: &ObjRef) {
        let (tup_loc, tup_len, vec_len) = {
            let h = self.0.heap.state().borrow();
            let loc = h.roots.get(self.0.slot);
            let tup = h.word(loc + 2);
            (tup, h.word(tup + 1), h.word(loc + 1))
        };
        if tup_len == vec_len {
            let doubled = TupRef::copy_from(&self.0.heap, tup_loc, 2 * vec_len);
            let new_tup = doubled.share();
            // Reacquire after the allocation above: the vector itself may
            // have moved; the root slot is authoritative.
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(self.0.slot);
            let old = h.word(loc + 2);
            h.unshare(old);
            h.set_word(loc + 2, new_tup);
            h.tracer.set_ref(loc + 2, new_tup);
        }
        let shared = obj.share();
        let mut h = self.0.heap.state().borrow_mut();
        let loc = h.roots.get(self.0.slot);
        let tup = h.word(loc + 2);
        let len = h.word(loc + 1);
        h.tup_set(tup, len, shared);
        h.set_word(loc + 1, len + 1);
        h.tracer.set_num(loc + 1, (len + 1) as i16);
    }

    /// Whether any element's `j`-th field equals `obj`.
    pub fn contains(&self, j: u16, obj: &ObjRef) -> bool {
        for i in 0..self.length() {
            let other = self.get_at(i, j);
            if obj.equals(&other) {
                return true;
            }
        }
        false
    }
}

impl Deref for VecRef {
    type Target = ObjRef;
    fn deref(&self) -> &ObjRef {
        &self.0
    }
}

/// Handle to a byte string stored one character per word.
pub struct StrRef(ObjRef);

impl StrRef {
    pub fn new(heap: &Heap, data: &str) -> StrRef {
        let r = ObjRef::alloc(heap, object::str_size(data.len() as u16));
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_str(loc, data.as_bytes());
        }
        StrRef(r)
    }

    /// An uninitialised string of `len` characters, to be filled by a
    /// bulk copy.
    pub fn with_len(heap: &Heap, len: u16) -> StrRef {
        let r = ObjRef::alloc(heap, object::str_size(len));
        {
            let mut h = heap.state().borrow_mut();
            let loc = h.roots.get(r.slot);
            h.init_str_uninit(loc, len);
        }
        StrRef(r)
    }

    /// Reinterprets a generic handle known to reference a string.
    pub fn from_obj(obj: ObjRef) -> StrRef {
        assert_eq!(obj.type_tag(), TypeTag::Str, "not a string");
        StrRef(obj)
    }

    pub fn text(&self) -> String {
        let h = self.0.heap.state().borrow();
        let loc = h.roots.get(self.0.slot);
        h.str_text(loc)
    }

    /// Splits on `sep` into a vector of fresh substrings. No separator
    /// yields a single segment equal to the whole string.
    pub fn split(&self, sep: u8) -> VecRef {
        let segments = {
            let mut h = self.0.heap.state().borrow_mut();
            let loc = h.roots.get(self.0.slot);
            h.str_split(loc, sep)
        };
        let fields = VecRef::new(&self.0.heap, segments.len() as u16);
        for (begin, end) in segments {
            let substr = StrRef::with_len(&self.0.heap, end - begin);
            {
                let mut h = self.0.heap.state().borrow_mut();
                let src = h.roots.get(self.0.slot); // reacquire after the allocation
                let dest = h.roots.get(substr.0.slot);
                h.str_copy_into(src, begin, end, dest);
            }
            fields.push(&substr);
        }
        fields
    }
}

impl Deref for StrRef {
    type Target = ObjRef;
    fn deref(&self) -> &ObjRef {
        &self.0
    }
}
