//! Criterion benchmarks for tile layout.
//!
//! Relayout runs on every host slot change, including during a live host
//! resize drag, so mapping a group onto its slot has to stay well below one
//! frame.
//!
//! Run with:
//! ```bash
//! cargo bench --package tabhost-core --bench tile_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabhost_core::{Rect, TileDistributor, TileGroup, WindowHandle};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// A 4K-ish slot with an odd size so rounding is exercised.
const SLOT: Rect = Rect::new(0, 40, 3839, 2119);

fn build_group(n: usize) -> TileGroup {
    let members = (0..n as u64).map(|i| WindowHandle(0x1000 + i)).collect();
    TileGroup::new(members).expect("n >= 2 distinct members form a valid group")
}

// ── Benchmarks: fractional layout ─────────────────────────────────────────────

fn bench_layout_fixed_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");

    for n in [2usize, 3, 4] {
        group.bench_with_input(BenchmarkId::new("fixed", n), &n, |b, &n| {
            b.iter(|| TileDistributor::layout(black_box(n)))
        });
    }

    group.finish();
}

fn bench_layout_grid_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_grid_scaling");

    for n in [5usize, 9, 16, 32] {
        group.bench_with_input(BenchmarkId::new("members", n), &n, |b, &n| {
            b.iter(|| TileDistributor::layout(black_box(n)))
        });
    }

    group.finish();
}

// ── Benchmarks: absolute mapping ──────────────────────────────────────────────

fn bench_member_rects(c: &mut Criterion) {
    let mut group = c.benchmark_group("member_rects");

    for n in [2usize, 4, 9] {
        let tiles = build_group(n);
        group.bench_with_input(BenchmarkId::new("members", n), &tiles, |b, tiles| {
            b.iter(|| tiles.member_rects(black_box(&SLOT)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_layout_fixed_counts,
    bench_layout_grid_scaling,
    bench_member_rects,
);
criterion_main!(benches);
