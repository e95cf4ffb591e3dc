//! Benchmarks for blobheap store operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use blobheap::allocator::FitPolicy;
use blobheap::engine::Engine;
use blobheap::stream::MemoryStream;

fn engine_with(count: usize, payload: &[u8]) -> (Engine<MemoryStream>, Vec<u32>) {
    let mut engine = Engine::open(MemoryStream::default(), FitPolicy::BestFit).unwrap();
    let keys = (0..count).map(|_| engine.insert(payload).unwrap()).collect();
    (engine, keys)
}

fn store_benchmarks(c: &mut Criterion) {
    let payload = vec![0xA5u8; 256];

    c.bench_function("insert_append_256b", |b| {
        b.iter_batched(
            || engine_with(0, &payload).0,
            |mut engine| {
                for _ in 0..100 {
                    black_box(engine.insert(&payload).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("read_256b", |b| {
        let (mut engine, keys) = engine_with(1_000, &payload);
        let mut i = 0;
        b.iter(|| {
            let key = keys[i % keys.len()];
            i += 1;
            black_box(engine.read(key).unwrap())
        })
    });

    // Delete every other blob, then refill the holes through the free list
    c.bench_function("reuse_fragmented_free_space", |b| {
        b.iter_batched(
            || {
                let (mut engine, keys) = engine_with(500, &payload);
                for key in keys.iter().step_by(2) {
                    engine.delete(*key).unwrap();
                }
                engine
            },
            |mut engine| {
                for _ in 0..250 {
                    black_box(engine.insert(&payload[..200]).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("update_grow_relocate", |b| {
        let larger = vec![0x5Au8; 400];
        b.iter_batched(
            || engine_with(200, &payload),
            |(mut engine, keys)| {
                for key in keys {
                    engine.update(key, &larger).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, store_benchmarks);
criterion_main!(benches);
