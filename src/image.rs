//! XPM frame rendering.
//!
//! One frame per mutation-visible event or instrumented read, each a
//! snapshot of the whole heap: every word becomes a square of pixels
//! coloured by its current role and the recency of its last access.
//! Black is free, grey is allocated-but-untouched, red is a fresh
//! bookkeeping write, greens age a read, yellows age a value write.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::warn;

use crate::trace::{CellInfo, CellMap, Time, TraceEvent, TraceSink};
use crate::{Loc, HEAP_SIZE};

/// Pixel edge of one heap word.
pub const IMAGE_WORD_SIZE: usize = 5;
/// Heap words per pixel row.
pub const IMAGE_WIDTH_IN_WORDS: usize = 25;
pub const IMAGE_WIDTH: usize = IMAGE_WIDTH_IN_WORDS * IMAGE_WORD_SIZE;
pub const IMAGE_HEIGHT: usize = (HEAP_SIZE / IMAGE_WIDTH_IN_WORDS) * IMAGE_WORD_SIZE;

const READ_RAMP: [char; 4] = ['0', '1', '2', '3'];
const WRITE_RAMP: [char; 4] = ['a', 'b', 'c', 'd'];

/// Palette character for one cell: recency buckets at 5, 25 and 125
/// ticks, grey for never-touched, red for fresh overhead.
fn color_of(cell: CellInfo, now: Time) -> char {
    if !cell.is_allocated() {
        return ' ';
    }
    let (ramp, age) = if cell.last_read() > cell.last_write() {
        (READ_RAMP, now - cell.last_read())
    } else {
        (WRITE_RAMP, now - cell.last_write())
    };
    if age == now {
        return '+';
    }
    if age < 5 {
        if cell.is_overhead() {
            '#'
        } else {
            ramp[0]
        }
    } else if age < 25 {
        ramp[1]
    } else if age < 125 {
        ramp[2]
    } else {
        ramp[3]
    }
}

fn render(cells: &CellMap) -> String {
    let mut out = String::with_capacity(IMAGE_WIDTH * IMAGE_HEIGHT + 512);
    out.push_str("/* XPM */\n");
    out.push_str("static char * plaid[] =\n{\n");
    out.push_str("/* width height ncolors chars_per_pixel */\n");
    out.push_str(&format!("\"{} {} 11 1\",\n", IMAGE_WIDTH, IMAGE_HEIGHT));
    out.push_str("/* colors */\n");
    out.push_str("\"  c black\",\n");
    out.push_str("\"+ c #888888\",\n");
    out.push_str("\"# c #ff0000\",\n");
    out.push_str("\"0 c #00ff00\",\n");
    out.push_str("\"1 c #22cc22\",\n");
    out.push_str("\"2 c #22aa22\",\n");
    out.push_str("\"3 c #228822\",\n");
    out.push_str("\"a c #ffff00\",\n");
    out.push_str("\"b c #cccc22\",\n");
    out.push_str("\"c c #aaaa22\",\n");
    out.push_str("\"d c #888822\",\n");
    out.push_str("/* pixels */\n");

    let now = cells.time();
    let mut row = String::with_capacity(IMAGE_WIDTH);
    for loc in 0..HEAP_SIZE {
        let c = color_of(cells.cell(loc as Loc), now);
        for _ in 0..IMAGE_WORD_SIZE {
            row.push(c);
        }
        if row.len() == IMAGE_WIDTH {
            for _ in 0..IMAGE_WORD_SIZE {
                out.push('"');
                out.push_str(&row);
                out.push_str("\",\n");
            }
            row.clear();
        }
    }
    out.push_str("};\n");
    out
}

/// A sink that drops one numbered XPM file per event into a directory.
pub struct FrameWriter {
    dir: PathBuf,
    frame: u32,
}

impl FrameWriter {
    pub fn new(dir: impl Into<PathBuf>) -> FrameWriter {
        FrameWriter {
            dir: dir.into(),
            frame: 0,
        }
    }

    fn snap(&mut self, cells: &CellMap) {
        let path = self.dir.join(format!("img{:08}.xpm", self.frame));
        self.frame += 1;
        let result = File::create(&path).and_then(|file| {
            let mut out = BufWriter::new(file);
            out.write_all(render(cells).as_bytes())
        });
        if let Err(err) = result {
            warn!("frame {} not written: {}", path.display(), err);
        }
    }
}

impl TraceSink for FrameWriter {
    fn event(&mut self, _event: &TraceEvent, cells: &CellMap) {
        self.snap(cells);
    }

    fn read_tick(&mut self, cells: &CellMap) {
        self.snap(cells);
    }
}
