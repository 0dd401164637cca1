// Transaction management: handles, lifecycle, and record-level locking

pub mod concurrency;

// Public exports
pub use concurrency::lock_manager::{LockManager, LockMode};
pub use concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionError, TransactionState,
};
pub use concurrency::transaction_manager::{TransactionManager, TransactionRegistry};
