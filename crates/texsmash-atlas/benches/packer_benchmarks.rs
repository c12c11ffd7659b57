use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::UVec2;
use texsmash_atlas::*;

/// Deterministic spread of cell sizes between 16 and 256 texels.
fn sample_rects(count: usize) -> Vec<PackableRect<usize>> {
    (0..count)
        .map(|i| {
            let w = 16 + (i * 37 % 15) as u32 * 16;
            let h = 16 + (i * 53 % 15) as u32 * 16;
            PackableRect::new(i, UVec2::new(w, h))
        })
        .collect()
}

fn bench_pack_skip_distance(c: &mut Criterion) {
    let rects = sample_rects(64);
    let canvas = UVec2::splat(2048);
    let mut group = c.benchmark_group("pack_64_rects");
    for skip in [4u32, 8, 16, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(skip), &skip, |bencher, &skip| {
            bencher.iter(|| black_box(pack_rects(rects.clone(), black_box(canvas), skip)))
        });
    }
    group.finish();
}

fn bench_pack_many_small(c: &mut Criterion) {
    let rects: Vec<_> = (0..512)
        .map(|i| PackableRect::new(i, UVec2::splat(32)))
        .collect();
    c.bench_function("pack_512_small", |bencher| {
        bencher.iter(|| {
            black_box(pack_rects(
                rects.clone(),
                black_box(UVec2::splat(1024)),
                DEFAULT_SKIP_DISTANCE,
            ))
        })
    });
}

criterion_group!(benches, bench_pack_skip_distance, bench_pack_many_small);
criterion_main!(benches);
