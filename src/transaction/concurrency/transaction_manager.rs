use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};

/// Shared id-to-transaction lookup.
///
/// The lock manager resolves wound victims through this registry, so it is
/// injected into both the lock manager and the transaction manager rather
/// than living as ambient state in either.
#[derive(Default)]
pub struct TransactionRegistry {
    txns: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live transaction by id
    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.lock().get(&txn_id).cloned()
    }

    pub(crate) fn insert(&self, txn: Arc<Transaction>) {
        self.txns.lock().insert(txn.id(), txn);
    }

    pub(crate) fn remove(&self, txn_id: TxnId) {
        self.txns.lock().remove(&txn_id);
    }
}

/// Transaction manager - creates transactions and drives commit/rollback
pub struct TransactionManager {
    /// Next transaction ID to assign; assignment order doubles as age order
    next_txn_id: AtomicU32,

    /// Registry shared with the lock manager
    registry: Arc<TransactionRegistry>,

    /// Lock manager used to release held locks on commit and rollback
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>, registry: Arc<TransactionRegistry>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            registry,
            lock_manager,
        }
    }

    /// Begin a new transaction
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.registry.insert(txn.clone());
        txn
    }

    /// Commit a transaction, releasing every lock it still holds.
    ///
    /// A transaction that was wounded while this thread was working is
    /// rolled back instead, and the caller learns about it here.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Aborted => {
                self.lock_manager.release_all(txn);
                self.registry.remove(txn.id());
                Err(TransactionError::Wounded(txn.id()))
            }
            TransactionState::Committed => Err(TransactionError::InvalidState(txn.id())),
            _ => {
                txn.set_state(TransactionState::Committed);
                self.lock_manager.release_all(txn);
                self.registry.remove(txn.id());
                Ok(())
            }
        }
    }

    /// Abort a transaction, releasing every lock it still holds
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(txn);
        self.registry.remove(txn.id());
        Ok(())
    }
}
