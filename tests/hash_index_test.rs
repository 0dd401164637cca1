use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rand::prelude::*;

use karstdb::index::hash::{ExtendibleHashTable, HashIndexError, KeyHasher, XxKeyHasher};

mod common;
use common::create_test_buffer_pool;

/// Hasher whose output is the key itself, so tests steer keys into
/// specific directory slots
struct IdentityHasher;

impl KeyHasher<u32> for IdentityHasher {
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}

#[test]
fn test_insert_and_get_roundtrip() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table = ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher)?;

    for i in 0..500u32 {
        assert!(table.insert(&i, &(i * 10))?);
    }

    for i in 0..500u32 {
        assert_eq!(table.get(&i)?, vec![i * 10]);
    }
    assert!(table.get(&10_000)?.is_empty());

    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_duplicate_values_under_one_key() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table = ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher)?;

    assert!(table.insert(&7, &1)?);
    assert!(table.insert(&7, &2)?);
    assert!(table.insert(&7, &3)?);

    let mut values = table.get(&7)?;
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_exact_duplicate_pair_rejected() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table = ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher)?;

    assert!(table.insert(&1, &100)?);
    assert!(!table.insert(&1, &100)?);

    // Remove succeeds exactly once
    assert!(table.remove(&1, &100)?);
    assert!(!table.remove(&1, &100)?);
    Ok(())
}

#[test]
fn test_split_doubles_directory_and_redistributes() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table =
        ExtendibleHashTable::<u32, u32, _>::with_bucket_capacity(buffer_pool, IdentityHasher, 4)?;

    // Hashes {0, 4, 8, 12} collide on the low two bits, so the first two
    // splits keep everything in one bucket and depth keeps growing
    for key in [0u32, 4, 8, 12] {
        assert!(table.insert(&key, &key)?);
    }
    assert_eq!(table.global_depth()?, 0);

    // The fifth insert forces splits until bit 2 separates the keys
    assert!(table.insert(&16, &16)?);
    assert_eq!(table.global_depth()?, 3);
    table.verify_integrity()?;

    for key in [0u32, 4, 8, 12, 16] {
        assert_eq!(table.get(&key)?, vec![key]);
    }
    Ok(())
}

#[test]
fn test_merge_collapses_empty_bucket_and_halves_directory() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table =
        ExtendibleHashTable::<u32, u32, _>::with_bucket_capacity(buffer_pool, IdentityHasher, 4)?;

    for key in [0u32, 4, 8, 12, 16] {
        assert!(table.insert(&key, &key)?);
    }
    assert_eq!(table.global_depth()?, 3);

    // Keys 4 and 12 share a depth-3 bucket; emptying it merges the bucket
    // into its buddy and lets the directory drop a bit
    assert!(table.remove(&4, &4)?);
    table.verify_integrity()?;
    assert!(table.remove(&12, &12)?);
    table.verify_integrity()?;
    assert_eq!(table.global_depth()?, 2);

    for key in [0u32, 8, 16] {
        assert_eq!(table.get(&key)?, vec![key]);
    }
    assert!(table.get(&4)?.is_empty());
    assert!(table.get(&12)?.is_empty());
    Ok(())
}

#[test]
fn test_buddy_with_different_depth_is_not_merged() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table =
        ExtendibleHashTable::<u32, u32, _>::with_bucket_capacity(buffer_pool, IdentityHasher, 4)?;

    for key in [0u32, 4, 8, 12, 16] {
        assert!(table.insert(&key, &key)?);
    }
    assert_eq!(table.global_depth()?, 3);

    // Slot 0's bucket (depth 3) still holds {0, 8, 16}; removing from a
    // depth-1 region must not touch the directory shape
    let depth_before = table.global_depth()?;
    assert!(!table.remove(&1, &1)?);
    assert_eq!(table.global_depth()?, depth_before);
    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_random_workload_matches_reference_set() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(100)?;
    let table =
        ExtendibleHashTable::<u32, u32, _>::with_bucket_capacity(buffer_pool, XxKeyHasher, 16)?;

    let mut rng = StdRng::seed_from_u64(42);
    let mut reference: HashSet<(u32, u32)> = HashSet::new();

    // Values per key stay well below the bucket capacity: entries sharing a
    // key share a hash, so no split could ever separate them
    for _ in 0..2_000 {
        let key = rng.gen_range(0..500u32);
        let value = rng.gen_range(0..6u32);

        if rng.gen_bool(0.6) {
            let inserted = table.insert(&key, &value)?;
            assert_eq!(inserted, reference.insert((key, value)));
        } else {
            let removed = table.remove(&key, &value)?;
            assert_eq!(removed, reference.remove(&(key, value)));
        }
    }

    table.verify_integrity()?;

    for key in 0..500u32 {
        let mut expected: Vec<u32> = reference
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .collect();
        expected.sort_unstable();

        let mut actual = table.get(&key)?;
        actual.sort_unstable();
        assert_eq!(actual, expected, "mismatch for key {}", key);
    }
    Ok(())
}

#[test]
fn test_construction_fails_when_pool_exhausted() -> Result<()> {
    // One frame is not enough for a directory page plus a bucket page
    let (buffer_pool, _temp_file) = create_test_buffer_pool(1)?;
    let result = ExtendibleHashTable::<u32, u32, _>::new(buffer_pool, XxKeyHasher);
    assert!(matches!(result, Err(HashIndexError::OutOfMemory)));
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writers() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(100)?;
    let table = Arc::new(ExtendibleHashTable::<u32, u32, _>::with_bucket_capacity(
        buffer_pool,
        XxKeyHasher,
        8,
    )?);

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let table = table.clone();
            thread::spawn(move || {
                for i in 0..100u32 {
                    let key = t * 1_000 + i;
                    table.insert(&key, &key).unwrap();
                    // Interleave reads with the ongoing inserts
                    assert_eq!(table.get(&key).unwrap(), vec![key]);
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    table.verify_integrity()?;
    for t in 0..4u32 {
        for i in 0..100u32 {
            let key = t * 1_000 + i;
            assert_eq!(table.get(&key)?, vec![key]);
        }
    }
    Ok(())
}
