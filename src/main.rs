use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use log::info;
use structopt::StructOpt;

use gc_workbench::{dkp, Algorithm, FrameWriter, Heap, HeapConfig, ScriptWriter};

/// Replays the DKP standings demo on the instrumented heap, emitting the
/// trace script on stdout and one XPM frame per event into the current
/// directory.
#[derive(Debug, StructOpt)]
#[structopt(name = "dkp", about = "Points-log demo on the traced toy heap")]
struct Opt {
    /// Input records, one `amount,person,thing` per line. A small bundled
    /// log is used when omitted.
    #[structopt(name = "INPUT", parse(from_os_str))]
    input: Option<PathBuf>,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "gc-ref-count")] {
        const ALGORITHM: Algorithm = Algorithm::RefCount;
    } else if #[cfg(feature = "gc-copy")] {
        const ALGORITHM: Algorithm = Algorithm::Copying;
    } else if #[cfg(feature = "gc-mark-compact")] {
        const ALGORITHM: Algorithm = Algorithm::MarkCompact;
    } else {
        const ALGORITHM: Algorithm = Algorithm::MarkSweep;
    }
}

const BUNDLED_LOG: &str = include_str!("../data/dkp.log-small");

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let input = match &opt.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => BUNDLED_LOG.to_string(),
    };

    let heap = Heap::new(
        HeapConfig::new(ALGORITHM)
            .sink(Box::new(ScriptWriter::new(io::stdout())))
            .sink(Box::new(FrameWriter::new("."))),
    );
    info!("collector: {:?}", heap.algorithm());

    println!("var frame_content = [");
    heap.start_trace();
    let ranking = dkp::run(&heap, &input);
    heap.stop_trace();
    println!("// {}", ranking.render());
    println!("['stop']];");

    Ok(())
}
