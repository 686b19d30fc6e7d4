use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vmcore::memory::{Arena, ChunkPools, INIT_SIZE, TINY_SIZE};

fn bench_alloc(c: &mut Criterion) {
    let pools = ChunkPools::with_zap(false);
    let mut group = c.benchmark_group("arena_alloc");

    for size in [16usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut arena = Arena::with_pools(&pools, INIT_SIZE);
                for _ in 0..256 {
                    black_box(arena.alloc(size));
                }
            });
        });
    }

    group.finish();
}

fn bench_mark_restore(c: &mut Criterion) {
    let pools = ChunkPools::with_zap(false);
    let mut arena = Arena::with_pools(&pools, TINY_SIZE);

    c.bench_function("arena_mark_restore", |b| {
        b.iter(|| {
            let mark = arena.mark();
            for _ in 0..64 {
                black_box(arena.alloc(200));
            }
            arena.restore(mark);
        });
    });
}

fn bench_pool_recycle(c: &mut Criterion) {
    let pools = ChunkPools::with_zap(false);

    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let chunk = pools.acquire(INIT_SIZE);
            pools.release(black_box(chunk));
        });
    });
}

criterion_group!(benches, bench_alloc, bench_mark_restore, bench_pool_recycle);
criterion_main!(benches);
