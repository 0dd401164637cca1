// Export public modules
pub mod common;
pub mod index;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use index::hash::ExtendibleHashTable;
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use transaction::concurrency::lock_manager::LockManager;
pub use transaction::concurrency::transaction_manager::{TransactionManager, TransactionRegistry};
