use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use karstdb::storage::buffer::BufferPoolManager;
use karstdb::transaction::concurrency::lock_manager::LockManager;
use karstdb::transaction::concurrency::transaction_manager::{
    TransactionManager, TransactionRegistry,
};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Create a lock manager wired to a transaction manager through a shared registry
#[allow(dead_code)]
pub fn create_lock_environment() -> (Arc<LockManager>, Arc<TransactionManager>) {
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = Arc::new(LockManager::new(registry.clone()));
    let txn_manager = Arc::new(TransactionManager::new(lock_manager.clone(), registry));
    (lock_manager, txn_manager)
}
