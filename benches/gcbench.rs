use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gc_workbench::{Algorithm, Heap, HeapConfig, NumRef, TupRef, VecRef};

/// Builds a list of `(num, _)` pairs, exercising allocation, slot stores
/// and vector growth.
fn churn(heap: &Heap, pairs: i16) -> VecRef {
    let list = VecRef::new(heap, 1);
    for i in 0..pairs {
        let pair = TupRef::new(heap, 2);
        let n = NumRef::new(heap, i);
        pair.set(0, &n);
        list.push(&pair);
    }
    list
}

fn bench_collectors(c: &mut Criterion) {
    for &(name, algorithm) in &[
        ("ref-count churn", Algorithm::RefCount),
        ("mark-sweep cycle", Algorithm::MarkSweep),
        ("copying cycle", Algorithm::Copying),
        ("mark-compact cycle", Algorithm::MarkCompact),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let heap = Heap::new(HeapConfig::new(algorithm));
                let keep = churn(&heap, 12);
                drop(churn(&heap, 12));
                heap.gc();
                black_box(keep.length())
            })
        });
    }
}

criterion_group!(benches, bench_collectors);
criterion_main!(benches);
