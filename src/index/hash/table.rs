use std::marker::PhantomData;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::types::PageId;
use crate::index::hash::bucket_page::HashBucket;
use crate::index::hash::directory_page::{HashDirectory, MAX_GLOBAL_DEPTH};
use crate::index::hash::error::HashIndexError;
use crate::index::hash::key::{FixedLenCodec, KeyHasher, XxKeyHasher};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::BufferPoolManager;

/// Extendible hash index over buffer-pool pages.
///
/// One directory page maps the low `global_depth` bits of a key's hash to a
/// bucket page; buckets split (doubling the directory when needed) as they
/// fill and merge with their buddy (halving the directory when possible) as
/// they empty. The `(key, value)` pair is the unit of uniqueness, so one key
/// may map to several values.
///
/// Concurrency is a single table-wide reader/writer latch: lookups share the
/// read side, every mutation takes the write side.
pub struct ExtendibleHashTable<K, V, H = XxKeyHasher> {
    buffer_pool: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    hasher: H,
    bucket_capacity: usize,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, H> ExtendibleHashTable<K, V, H>
where
    K: FixedLenCodec,
    V: FixedLenCodec,
    H: KeyHasher<K>,
{
    /// Create a table whose buckets use the full page capacity
    pub fn new(buffer_pool: Arc<BufferPoolManager>, hasher: H) -> Result<Self, HashIndexError> {
        let capacity = HashBucket::<K, V>::max_slots();
        Self::with_bucket_capacity(buffer_pool, hasher, capacity)
    }

    /// Create a table with a reduced bucket capacity. Mainly useful for
    /// exercising splits and merges without filling whole pages.
    pub fn with_bucket_capacity(
        buffer_pool: Arc<BufferPoolManager>,
        hasher: H,
        bucket_capacity: usize,
    ) -> Result<Self, HashIndexError> {
        let bucket_capacity = bucket_capacity.clamp(1, HashBucket::<K, V>::max_slots());

        let (directory_page, directory_page_id) = Self::allocate_page(&buffer_pool)?;
        let (bucket_page, bucket_page_id) = match Self::allocate_page(&buffer_pool) {
            Ok(pair) => pair,
            Err(e) => {
                buffer_pool.unpin_page(directory_page_id, false)?;
                return Err(e);
            }
        };

        let mut directory = HashDirectory::new();
        directory.set_bucket_page_id(0, bucket_page_id);
        {
            let mut guard = directory_page.write();
            directory.encode(&mut guard);
        }
        {
            let mut guard = bucket_page.write();
            HashBucket::<K, V>::new(bucket_capacity).encode(&mut guard);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id, true)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            hasher,
            bucket_capacity,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Collect every value stored under `key`
    pub fn get(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let _guard = self.table_latch.read();

        let directory = self.read_directory()?;
        let bucket_page_id = self.bucket_page_for(&directory, key);
        let bucket = self.read_bucket(bucket_page_id)?;

        Ok(bucket.get_value(key))
    }

    /// Insert a key/value pair. Returns `false` when the exact pair is
    /// already present.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _guard = self.table_latch.write();
        self.insert_locked(key, value)
    }

    /// Remove the exact key/value pair. Returns `false` when absent.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _guard = self.table_latch.write();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = {
            let guard = directory_page.read();
            HashDirectory::decode(&guard)
        };

        let idx = self.directory_index(&directory, key);
        let bucket_page_id = directory.bucket_page_id(idx);

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut bucket = {
            let guard = bucket_page.read();
            HashBucket::<K, V>::decode(&guard, self.bucket_capacity)
        };

        let removed = bucket.remove(key, value);
        if removed {
            let mut guard = bucket_page.write();
            bucket.encode(&mut guard);
        }

        if bucket.is_empty() {
            let depth = directory.local_depth(idx);
            if depth > 0 {
                let buddy = directory.split_image_index(idx);
                if directory.local_depth(buddy) == depth {
                    self.merge(&mut directory, idx, bucket_page_id);
                    {
                        let mut guard = directory_page.write();
                        directory.encode(&mut guard);
                    }

                    // Retire the dead bucket page once its pin is released
                    self.buffer_pool.unpin_page(bucket_page_id, removed)?;
                    self.buffer_pool.flush_page(bucket_page_id)?;
                    self.buffer_pool.delete_page(bucket_page_id)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, true)?;
                    return Ok(removed);
                }
            }
        }

        self.buffer_pool.unpin_page(bucket_page_id, removed)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(removed)
    }

    /// Current global depth of the directory
    pub fn global_depth(&self) -> Result<u32, HashIndexError> {
        let _guard = self.table_latch.read();
        let directory = self.read_directory()?;
        Ok(directory.global_depth())
    }

    /// Assert the directory's structural invariants; panics on violation
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let _guard = self.table_latch.read();
        let directory = self.read_directory()?;
        directory.verify_integrity();
        Ok(())
    }

    fn insert_locked(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let directory = self.read_directory()?;
        let bucket_page_id = self.bucket_page_for(&directory, key);

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut bucket = {
            let guard = bucket_page.read();
            HashBucket::<K, V>::decode(&guard, self.bucket_capacity)
        };

        if !bucket.is_full() {
            let inserted = bucket.insert(key, value);
            if inserted {
                let mut guard = bucket_page.write();
                bucket.encode(&mut guard);
            }
            self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
            return Ok(inserted);
        }

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.split_insert(key, value)
    }

    /// Split the overfull bucket the key maps to, then retry the insert.
    ///
    /// Recurses while the redistributed entries keep landing on one side;
    /// each round strictly increases the bucket's local depth, so the
    /// recursion is bounded by the maximum directory depth.
    fn split_insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = {
            let guard = directory_page.read();
            HashDirectory::decode(&guard)
        };

        let idx = self.directory_index(&directory, key);
        let old_page_id = directory.bucket_page_id(idx);
        let old_depth = directory.local_depth(idx);

        if old_depth >= MAX_GLOBAL_DEPTH {
            // Every usable hash bit already distinguishes this bucket; the
            // remaining keys collide on all of them
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(false);
        }

        let old_page = self.buffer_pool.fetch_page(old_page_id)?;
        let mut old_bucket = {
            let guard = old_page.read();
            HashBucket::<K, V>::decode(&guard, self.bucket_capacity)
        };

        let (new_page, new_page_id) = match self.buffer_pool.new_page() {
            Ok(pair) => pair,
            Err(BufferPoolError::BufferPoolFull) => {
                self.buffer_pool.unpin_page(old_page_id, false)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(HashIndexError::OutOfMemory);
            }
            Err(e) => {
                self.buffer_pool.unpin_page(old_page_id, false)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };

        directory.incr_local_depth(idx);

        if directory.local_depth(idx) > directory.global_depth() {
            let old_size = directory.size();
            directory.incr_global_depth();
            for i in old_size..directory.size() {
                directory.set_bucket_page_id(i, directory.bucket_page_id(i - old_size));
                directory.set_local_depth(i, directory.local_depth(i - old_size) as u8);
            }
            debug!(
                "hash directory doubled to global depth {}",
                directory.global_depth()
            );
        }

        // Repoint every slot in the split bucket's depth class: bit
        // `old_depth` of the slot index now chooses between old and new page
        let low_mask = (1usize << old_depth) - 1;
        for i in 0..directory.size() {
            if (i ^ idx) & low_mask == 0 {
                directory.set_local_depth(i, (old_depth + 1) as u8);
                if (i >> old_depth) & 1 == 1 {
                    directory.set_bucket_page_id(i, new_page_id);
                } else {
                    directory.set_bucket_page_id(i, old_page_id);
                }
            }
        }

        // Move the entries whose hash now selects the new bucket
        let mut new_bucket = HashBucket::<K, V>::new(self.bucket_capacity);
        for (k, v) in old_bucket.readable_entries() {
            if self.bucket_page_for(&directory, &k) == new_page_id {
                old_bucket.remove(&k, &v);
                new_bucket.insert(&k, &v);
            }
        }
        debug!(
            "split bucket page {} into {} at local depth {}",
            old_page_id,
            new_page_id,
            old_depth + 1
        );

        {
            let mut guard = old_page.write();
            old_bucket.encode(&mut guard);
        }
        {
            let mut guard = new_page.write();
            new_bucket.encode(&mut guard);
        }
        self.buffer_pool.unpin_page(old_page_id, true)?;
        self.buffer_pool.unpin_page(new_page_id, true)?;

        {
            let mut guard = directory_page.write();
            directory.encode(&mut guard);
        }
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;

        // Retry now that the entries are spread over two buckets
        self.insert_locked(key, value)
    }

    /// Fold the empty bucket into its buddy and shrink the directory while
    /// the top bit is unused
    fn merge(&self, directory: &mut HashDirectory, idx: usize, dead_page_id: PageId) {
        let buddy = directory.split_image_index(idx);
        let buddy_page_id = directory.bucket_page_id(buddy);

        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == dead_page_id {
                directory.set_bucket_page_id(i, buddy_page_id);
                directory.decr_local_depth(i);
            } else if directory.bucket_page_id(i) == buddy_page_id {
                directory.decr_local_depth(i);
            }
        }

        while directory.can_shrink() {
            directory.decr_global_depth();
        }
        debug!(
            "merged bucket page {} into {}, global depth now {}",
            dead_page_id,
            buddy_page_id,
            directory.global_depth()
        );
    }

    fn directory_index(&self, directory: &HashDirectory, key: &K) -> usize {
        (self.hasher.hash_key(key) & directory.global_depth_mask()) as usize
    }

    fn bucket_page_for(&self, directory: &HashDirectory, key: &K) -> PageId {
        directory.bucket_page_id(self.directory_index(directory, key))
    }

    /// Fetch and decode the directory page, releasing the pin immediately;
    /// the table latch keeps the decoded image current
    fn read_directory(&self) -> Result<HashDirectory, HashIndexError> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = {
            let guard = page.read();
            HashDirectory::decode(&guard)
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(directory)
    }

    fn read_bucket(&self, bucket_page_id: PageId) -> Result<HashBucket<K, V>, HashIndexError> {
        let page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let bucket = {
            let guard = page.read();
            HashBucket::<K, V>::decode(&guard, self.bucket_capacity)
        };
        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        Ok(bucket)
    }

    fn allocate_page(
        buffer_pool: &BufferPoolManager,
    ) -> Result<(crate::common::types::PagePtr, PageId), HashIndexError> {
        match buffer_pool.new_page() {
            Ok(pair) => Ok(pair),
            Err(BufferPoolError::BufferPoolFull) => Err(HashIndexError::OutOfMemory),
            Err(e) => Err(e.into()),
        }
    }
}
