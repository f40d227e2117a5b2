//! A small managed heap with four interchangeable garbage collectors,
//! instrumented so every memory event can be replayed as an animation.
//!
//! Objects live in a fixed array of words and are addressed by [`Loc`]
//! offsets rather than pointers, because the moving collectors rewrite
//! every reference they relocate. Client code holds [`handle::ObjRef`]
//! handles, which are registered in the root set and survive collections;
//! everything reachable from a handle stays alive, everything else is
//! reclaimed by whichever [`Algorithm`] the heap was built with.

pub mod collectors;
pub mod dkp;
pub mod handle;
pub mod heap;
pub mod image;
pub mod object;
pub mod trace;

pub use collectors::Algorithm;
pub use handle::{NumRef, ObjRef, StrRef, TupRef, VecRef};
pub use heap::{Heap, HeapCell, HeapConfig};
pub use image::FrameWriter;
pub use object::TypeTag;
pub use trace::{EventBuffer, Printable, ScriptWriter, TraceEvent, TraceSink};

/// One storage unit of the managed heap. Every object field is word sized.
pub type Word = u16;

/// A word offset into the heap array. Offset 0 is permanently the nil
/// object; a stored 0 means "no reference".
pub type Loc = u16;

/// Total heap capacity in words.
pub const HEAP_SIZE: usize = 2000;

/// Capacity of one semi-space under the copying collector.
pub const HEAP_SEMI_SIZE: usize = 1000;
