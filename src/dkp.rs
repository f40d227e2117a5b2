//! The demo workload: a DKP standings calculator run entirely on the
//! managed heap.
//!
//! Each input line is a raid-points transaction `amount,person,thing`.
//! The pipeline parses every line into a 3-tuple, groups transactions by
//! person, sums each person's amounts, and ranks the totals descending —
//! allocating, sharing, mutating and collecting as it goes, which is the
//! whole point: the resulting trace shows the collector at work on a
//! living object graph.

use log::info;

use crate::handle::{NumRef, StrRef, TupRef, VecRef};
use crate::heap::Heap;

/// Runs the full pipeline and returns the ranking vector: one
/// `(name, total)` pair per person, highest total first.
pub fn run(heap: &Heap, input: &str) -> VecRef {
    let log = parse(heap, input);
    heap.breakpoint("file parsed");
    info!("parsed {} transaction(s)", log.length());

    let groups = group(heap, &log);
    drop(log);
    heap.gc();
    heap.breakpoint("data grouped");
    info!("{} person(s)", groups.length());

    let standings = reduce(heap, &groups);
    drop(groups);
    heap.gc();

    let ranking = rank(heap, &standings);
    drop(standings);
    heap.gc();
    heap.breakpoint("ranking finished");
    ranking
}

/// One 3-tuple `(Num amount, Str person, Str thing)` per input line.
fn parse(heap: &Heap, input: &str) -> VecRef {
    let log = VecRef::new(heap, 1);
    let mut bp = 0;
    for line in input.lines() {
        let line = StrRef::new(heap, line);
        let fields = line.split(b',');
        let trans = TupRef::new(heap, 3);
        let amount = NumRef::new(heap, fields.get(0).to_int());
        trans.set(0, &amount);
        trans.set(1, &fields.get(1));
        trans.set(2, &fields.get(2));
        log.push(&trans);
        if bp == 1 {
            heap.breakpoint("line parsed");
        }
        bp += 1;
        if bp % 5 == 0 {
            heap.gc();
        }
    }
    log
}

/// One `(Str person, Vec history)` pair per distinct person, where the
/// history shares the transaction tuples with the parsed log.
fn group(heap: &Heap, log: &VecRef) -> VecRef {
    let groups = VecRef::new(heap, 1);
    let mut bp = 0;
    let len = log.length();
    for i in 0..len {
        if !groups.contains(0, &log.get_at(i, 1)) {
            let person = TupRef::new(heap, 2);
            person.set(0, &log.get_at(i, 1));
            let history = VecRef::new(heap, 1);
            person.set(1, &history);
            groups.push(&person);
            for j in i..len {
                if log.get_at(j, 1).equals(&person.get(0)) {
                    history.push(&log.get(j));
                }
            }
            if bp == 1 {
                heap.breakpoint("group found");
            }
            bp += 1;
        }
    }
    groups
}

/// Collapses each history into `(Str person, Num total)`.
fn reduce(heap: &Heap, groups: &VecRef) -> VecRef {
    let standings = VecRef::new(heap, 1);
    let mut bp = 0;
    for i in 0..groups.length() {
        let person = TupRef::new(heap, 2);
        person.set(0, &groups.get_at(i, 0));
        let history = VecRef::from_obj(groups.get_at(i, 1));
        let mut sum = 0;
        let total = NumRef::new(heap, sum);
        for j in 0..history.length() {
            let partial = NumRef::new(heap, sum + history.get_at(j, 0).to_int());
            sum = partial.to_int();
        }
        total.set(sum);
        person.set(1, &total);
        standings.push(&person);
        if bp == 1 {
            heap.breakpoint("transaction history reduced");
        }
        bp += 1;
    }
    standings
}

/// Bucket scan from the highest representable total down to zero; totals
/// outside 0..=20 fall off the board.
fn rank(heap: &Heap, standings: &VecRef) -> VecRef {
    let ranking = VecRef::new(heap, standings.length());
    for want in (0..=20i16).rev() {
        for i in 0..standings.length() {
            if standings.get_at(i, 1).to_int() == want {
                ranking.push(&standings.get(i));
            }
        }
    }
    ranking
}

/// Plain data view of a ranking vector, for display and assertions.
pub fn standings(ranking: &VecRef) -> Vec<(String, i16)> {
    (0..ranking.length())
        .map(|i| {
            let name = StrRef::from_obj(ranking.get_at(i, 0)).text();
            let total = ranking.get_at(i, 1).to_int();
            (name, total)
        })
        .collect()
}
