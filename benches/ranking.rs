//! Ranking and merge throughput over synthetic result sets.
//!
//! Sizes bracket the default rank budget so the round-robin cap shows up in
//! the larger runs.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pkgsift::merge::merge_candidates;
use pkgsift::rank::{rank, round_robin_cap};
use pkgsift::{Candidate, KnownManagers};
use std::hint::black_box;

const MANAGERS: [KnownManagers; 4] = [
    KnownManagers::Apt,
    KnownManagers::Brew,
    KnownManagers::Npm,
    KnownManagers::Flatpak,
];

fn synthetic_rows(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|i| {
            let manager = MANAGERS[i % MANAGERS.len()].clone();
            let package = match i % 5 {
                0 => format!("ripgrep-{i}"),
                1 => format!("rg{i}"),
                2 => format!("lib{i}-dev"),
                3 => format!("grep-tools-{i}"),
                _ => format!("pkg{i}"),
            };
            Candidate::new(manager, package, format!("  synthetic package number {i}"))
        })
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    for size in [100usize, 1_000, 5_000] {
        let rows = synthetic_rows(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| rank(black_box("ripgrep"), round_robin_cap(rows.clone(), 2_000)))
        });
    }
    group.finish();
}

fn bench_multi_token_rank(c: &mut Criterion) {
    let rows = synthetic_rows(1_000);
    c.bench_function("rank_multi_token", |b| {
        b.iter(|| rank(black_box("grep tools"), rows.clone()))
    });
}

fn bench_merge(c: &mut Criterion) {
    let mut rows = synthetic_rows(2_000);
    rows.extend(synthetic_rows(2_000));
    c.bench_function("merge_with_duplicates", |b| {
        b.iter(|| merge_candidates(black_box(rows.clone())))
    });
}

criterion_group!(benches, bench_rank, bench_multi_token_rank, bench_merge);
criterion_main!(benches);
