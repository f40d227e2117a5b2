//! The instrumentation log.
//!
//! Every allocator and mutator operation reports here. Events fan out to
//! pluggable sinks in order; alongside the events, a side array of
//! per-cell metadata (allocated, overhead, last-read, last-write) is kept
//! current so a renderer can colour cells by recency and role. All
//! observable activity is totally ordered by one monotonic counter,
//! bumped on each instrumented cell access.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use log::warn;

use crate::{Loc, HEAP_SIZE};

/// The monotonic event clock.
pub type Time = u32;

/// Visualisation metadata for one heap word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellInfo {
    allocated: bool,
    overhead: bool,
    last_read: Time,
    last_write: Time,
}

impl CellInfo {
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// True when the last write was bookkeeping (header, refcount,
    /// forwarding) rather than a user value.
    pub fn is_overhead(&self) -> bool {
        self.overhead
    }

    pub fn last_read(&self) -> Time {
        self.last_read
    }

    pub fn last_write(&self) -> Time {
        self.last_write
    }

    fn was_allocated(&mut self) {
        self.allocated = true;
        self.overhead = false;
        self.last_read = 0;
        self.last_write = 0;
    }

    fn was_freed(&mut self) {
        self.allocated = false;
    }

    fn was_read(&mut self, t: Time) {
        self.last_read = t;
    }

    fn was_written(&mut self, t: Time) {
        self.last_write = t;
        self.overhead = false;
    }

    fn was_overhead(&mut self, t: Time) {
        self.last_write = t;
        self.overhead = true;
    }
}

/// The per-cell side array plus the clock, as handed to sinks.
pub struct CellMap {
    cells: Box<[CellInfo]>,
    time: Time,
}

impl CellMap {
    fn new() -> CellMap {
        CellMap {
            cells: vec![CellInfo::default(); HEAP_SIZE].into_boxed_slice(),
            time: 0,
        }
    }

    pub fn cell(&self, loc: Loc) -> CellInfo {
        self.cells[loc as usize]
    }

    pub fn time(&self) -> Time {
        self.time
    }

    fn tick(&mut self) -> Time {
        self.time += 1;
        self.time
    }
}

/// A printable slot or field value carried by `set` records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Printable {
    Char(u8),
    Num(i16),
    Ref(Loc),
}

/// One record of the memory trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Alloc { loc: Loc, size: u16 },
    Free { loc: Loc, size: u16 },
    Init { loc: Loc, type_name: &'static str },
    Set { loc: Loc, value: Printable },
    RefCount { loc: Loc, count: u16 },
    Copy { to: Loc, from: Loc, size: u16 },
    Breakpoint { message: String },
    Roots { locs: Vec<Loc> },
    Live { locs: Vec<Loc> },
}

/// Receives trace events in order. `read_tick` fires on instrumented
/// reads, which leave no record but do advance the picture.
pub trait TraceSink {
    fn event(&mut self, event: &TraceEvent, cells: &CellMap);

    fn read_tick(&mut self, _cells: &CellMap) {}
}

pub(crate) struct Tracer {
    map: CellMap,
    started: bool,
    sinks: Vec<Box<dyn TraceSink>>,
}

impl Tracer {
    pub(crate) fn new(sinks: Vec<Box<dyn TraceSink>>) -> Tracer {
        Tracer {
            map: CellMap::new(),
            started: false,
            sinks,
        }
    }

    pub(crate) fn cell_map(&self) -> &CellMap {
        &self.map
    }

    pub(crate) fn start(&mut self) {
        self.started = true;
    }

    pub(crate) fn stop(&mut self) {
        self.started = false;
    }

    fn emit(&mut self, event: TraceEvent) {
        if !self.started {
            return;
        }
        let Tracer { sinks, map, .. } = self;
        for sink in sinks.iter_mut() {
            sink.event(&event, map);
        }
    }

    pub(crate) fn alloc(&mut self, loc: Loc, size: u16) {
        for i in 0..size {
            self.map.cells[(loc + i) as usize].was_allocated();
        }
        self.emit(TraceEvent::Alloc { loc, size });
    }

    pub(crate) fn free(&mut self, loc: Loc, size: u16) {
        for i in 0..size {
            self.map.cells[(loc + i) as usize].was_freed();
        }
        self.emit(TraceEvent::Free { loc, size });
    }

    pub(crate) fn init_obj(&mut self, loc: Loc, type_name: &'static str) {
        self.emit(TraceEvent::Init { loc, type_name });
    }

    pub(crate) fn ref_count(&mut self, loc: Loc, count: u16) {
        let t = self.map.tick();
        self.map.cells[loc as usize].was_overhead(t);
        self.emit(TraceEvent::RefCount { loc, count });
    }

    /// An instrumented read: no record, but the recency picture changes.
    pub(crate) fn get(&mut self, loc: Loc) {
        let t = self.map.tick();
        self.map.cells[loc as usize].was_read(t);
        if !self.started {
            return;
        }
        let Tracer { sinks, map, .. } = self;
        for sink in sinks.iter_mut() {
            sink.read_tick(map);
        }
    }

    pub(crate) fn set_num(&mut self, loc: Loc, val: i16) {
        let t = self.map.tick();
        self.map.cells[loc as usize].was_written(t);
        self.emit(TraceEvent::Set {
            loc,
            value: Printable::Num(val),
        });
    }

    pub(crate) fn set_char(&mut self, loc: Loc, val: u8) {
        let t = self.map.tick();
        self.map.cells[loc as usize].was_written(t);
        self.emit(TraceEvent::Set {
            loc,
            value: Printable::Char(val),
        });
    }

    pub(crate) fn set_ref(&mut self, loc: Loc, target: Loc) {
        let t = self.map.tick();
        self.map.cells[loc as usize].was_written(t);
        self.emit(TraceEvent::Set {
            loc,
            value: Printable::Ref(target),
        });
    }

    pub(crate) fn copy(&mut self, to: Loc, from: Loc, size: u16) {
        for i in 0..size {
            let t = self.map.tick();
            self.map.cells[(from + i) as usize].was_read(t);
            let t = self.map.tick();
            self.map.cells[(to + i) as usize].was_written(t);
        }
        self.emit(TraceEvent::Copy { to, from, size });
    }

    pub(crate) fn breakpoint(&mut self, message: &str) {
        self.emit(TraceEvent::Breakpoint {
            message: message.to_string(),
        });
    }

    pub(crate) fn roots(&mut self, locs: Vec<Loc>) {
        self.emit(TraceEvent::Roots { locs });
    }

    pub(crate) fn live(&mut self, locs: Vec<Loc>) {
        self.emit(TraceEvent::Live { locs });
    }
}

/// Writes the bracketed record stream the animation assembler consumes.
/// The surrounding `var frame_content = [` / `['stop']];` lines belong to
/// the caller.
pub struct ScriptWriter<W: Write> {
    out: W,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(out: W) -> ScriptWriter<W> {
        ScriptWriter { out }
    }

    fn write(&mut self, event: &TraceEvent) -> io::Result<()> {
        match event {
            TraceEvent::Alloc { loc, size } => writeln!(self.out, "['alloc',{},{}],", loc, size),
            TraceEvent::Free { loc, size } => writeln!(self.out, "['free',{},{}],", loc, size),
            TraceEvent::Init { loc, type_name } => {
                writeln!(self.out, "['init',{},'{}'],", loc, type_name)
            }
            TraceEvent::Set { loc, value } => match value {
                Printable::Char(c) => {
                    writeln!(self.out, "['set',{},\"'{}\"],", loc, *c as char)
                }
                Printable::Num(v) => writeln!(self.out, "['set',{},'={}'],", loc, v),
                Printable::Ref(target) => writeln!(self.out, "['set',{},{}],", loc, target),
            },
            TraceEvent::RefCount { loc, count } => {
                writeln!(self.out, "['ref_count',{},{}],", loc, count)
            }
            TraceEvent::Copy { to, from, size } => {
                writeln!(self.out, "['copy',{},{},{}],", to, from, size)
            }
            TraceEvent::Breakpoint { message } => writeln!(self.out, "['bp','{}'],", message),
            TraceEvent::Roots { locs } => self.write_loc_list("roots", locs),
            TraceEvent::Live { locs } => self.write_loc_list("live", locs),
        }
    }

    fn write_loc_list(&mut self, kind: &str, locs: &[Loc]) -> io::Result<()> {
        write!(self.out, "['{}'", kind)?;
        for loc in locs {
            write!(self.out, ",{}", loc)?;
        }
        writeln!(self.out, "],")
    }
}

impl<W: Write> TraceSink for ScriptWriter<W> {
    fn event(&mut self, event: &TraceEvent, _cells: &CellMap) {
        if let Err(err) = self.write(event) {
            warn!("trace script write failed: {}", err);
        }
    }
}

/// Aggregates events in memory; clones share the buffer, so a test can
/// hold one end while the heap writes the other.
#[derive(Clone, Default)]
pub struct EventBuffer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl EventBuffer {
    pub fn new() -> EventBuffer {
        EventBuffer::default()
    }

    pub fn take_all(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl TraceSink for EventBuffer {
    fn event(&mut self, event: &TraceEvent, _cells: &CellMap) {
        self.events.borrow_mut().push(event.clone());
    }
}
