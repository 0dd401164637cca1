use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use std::sync::Arc;
use karstdb::index::hash::{ExtendibleHashTable, XxKeyHasher};
use karstdb::storage::buffer::BufferPoolManager;

// Create temporary db for benchmarking
fn create_test_buffer_pool(pool_size: usize) -> Arc<BufferPoolManager> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path).unwrap());

    // Keep the temp file alive
    std::mem::forget(temp_file);

    buffer_pool
}

fn hash_index_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("HashIndex");

    for size in [1_000u32, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("insert", size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let buffer_pool = create_test_buffer_pool(256);
                    ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher).unwrap()
                },
                |table| {
                    for i in 0..size {
                        table.insert(&i, &i).unwrap();
                    }
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("point_lookup", size), size, |b, &size| {
            let buffer_pool = create_test_buffer_pool(256);
            let table = ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher).unwrap();
            for i in 0..size {
                table.insert(&i, &i).unwrap();
            }

            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let key = rng.gen_range(0..size);
                let values = table.get(&key).unwrap();
                assert_eq!(values.len(), 1);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, hash_index_benchmark);
criterion_main!(benches);
