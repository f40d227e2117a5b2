//! End-to-end runs of the demo pipeline.

use gc_workbench::{dkp, Algorithm, EventBuffer, Heap, HeapConfig, TraceEvent, TypeTag};

const BUNDLED: &str = include_str!("../data/dkp.log-small");

fn run_on(algorithm: Algorithm, input: &str) -> Vec<(String, i16)> {
    let heap = Heap::new(HeapConfig::new(algorithm));
    let ranking = dkp::run(&heap, input);
    dkp::standings(&ranking)
}

#[test]
fn a_single_record_ranks_alone() {
    let standings = run_on(Algorithm::MarkSweep, "10,alice,gold");
    assert_eq!(standings, vec![("alice".to_string(), 10)]);
}

#[test]
fn records_for_one_person_sum() {
    let standings = run_on(Algorithm::MarkSweep, "3,alice,x\n4,alice,y");
    assert_eq!(standings, vec![("alice".to_string(), 7)]);
}

#[test]
fn totals_rank_descending() {
    let standings = run_on(Algorithm::MarkSweep, "1,a,x\n2,b,y\n3,a,z");
    assert_eq!(
        standings,
        vec![("a".to_string(), 4), ("b".to_string(), 2)]
    );
}

#[test]
fn every_collector_computes_the_same_standings() {
    let expected = vec![
        ("durin".to_string(), 15),
        ("weasel".to_string(), 12),
        ("tanya".to_string(), 3),
    ];
    for &algorithm in &[
        Algorithm::RefCount,
        Algorithm::MarkSweep,
        Algorithm::Copying,
        Algorithm::MarkCompact,
    ] {
        assert_eq!(run_on(algorithm, BUNDLED), expected, "{:?}", algorithm);
    }
}

#[test]
fn only_ranking_structures_survive_the_pipeline() {
    for &algorithm in &[
        Algorithm::MarkSweep,
        Algorithm::Copying,
        Algorithm::MarkCompact,
    ] {
        let heap = Heap::new(HeapConfig::new(algorithm));
        let ranking = dkp::run(&heap, BUNDLED);
        heap.gc();

        let totals: Vec<i16> = dkp::standings(&ranking).iter().map(|(_, t)| *t).collect();
        let mut sorted = totals.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(totals, sorted, "{:?}: standings rank descending", algorithm);

        // With `ranking` as the only root, the collector may keep exactly
        // its closure: the vector, its backing tuple, and each person's
        // tuple, name and total. Everything but the backing tuple has a
        // handle path to name it by.
        let mut reachable = vec![ranking.loc()];
        for i in 0..ranking.length() {
            reachable.push(ranking.get(i).loc());
            reachable.push(ranking.get_at(i, 0).loc());
            reachable.push(ranking.get_at(i, 1).loc());
        }
        let survivors: Vec<_> = heap
            .cells()
            .into_iter()
            .filter(|cell| cell.tag != TypeTag::Free)
            .collect();
        let unaccounted: Vec<_> = survivors
            .iter()
            .filter(|cell| !reachable.contains(&cell.loc))
            .collect();
        assert_eq!(
            unaccounted.len(),
            1,
            "{:?}: only the backing store lacks a handle path",
            algorithm
        );
        assert_eq!(unaccounted[0].tag, TypeTag::Tup, "{:?}", algorithm);
        assert_eq!(
            survivors.len(),
            reachable.len() + 1,
            "{:?}: nothing else survives the pipeline",
            algorithm
        );
    }
}

#[test]
fn breakpoints_carry_roots_and_live_snapshots() {
    let events = EventBuffer::new();
    let heap = Heap::new(
        HeapConfig::new(Algorithm::MarkSweep).sink(Box::new(events.clone())),
    );
    heap.start_trace();
    let _ranking = dkp::run(&heap, BUNDLED);
    heap.stop_trace();

    let trace = events.take_all();
    let mut labels = Vec::new();
    for (i, event) in trace.iter().enumerate() {
        if let TraceEvent::Breakpoint { message } = event {
            labels.push(message.clone());
            assert!(
                matches!(trace[i + 1], TraceEvent::Roots { .. }),
                "a root snapshot follows every breakpoint"
            );
            assert!(
                matches!(trace[i + 2], TraceEvent::Live { .. }),
                "a live snapshot follows the roots"
            );
        }
    }
    assert_eq!(
        labels,
        vec![
            "line parsed",
            "file parsed",
            "group found",
            "data grouped",
            "transaction history reduced",
            "ranking finished",
        ]
    );
}

#[test]
fn the_ranking_vector_reads_back_as_pairs() {
    let heap = Heap::new(HeapConfig::new(Algorithm::MarkCompact));
    let ranking = dkp::run(&heap, "2,zo,cape\n5,ana,ring");
    assert_eq!(ranking.render(), "[[\"ana\",5],[\"zo\",2]]");
}
