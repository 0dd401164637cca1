// Represents an active database transaction as seen by the lock manager

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under strict two-phase locking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }
}

/// Why the lock manager force-aborted a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Lock acquired after the transaction started releasing locks
    LockOnShrinking,
    /// Shared lock requested at READ_UNCOMMITTED, which takes no read locks
    SharedOnReadUncommitted,
    /// A different transaction is already upgrading on the same record
    UpgradeConflict,
    /// Wounded by an older transaction while waiting
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            AbortReason::LockOnShrinking => "lock requested in shrinking phase",
            AbortReason::SharedOnReadUncommitted => "shared lock requested at read-uncommitted",
            AbortReason::UpgradeConflict => "another upgrade is already pending",
            AbortReason::Deadlock => "wounded by an older transaction",
        };
        write!(f, "{}", reason)
    }
}

/// Typed failure raised when a lock call aborts its transaction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbort {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

/// Errors that can occur during transaction lifecycle operations
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),

    #[error("Transaction {0} was wounded and has been rolled back")]
    Wounded(TxnId),
}

/// Transaction - represents an active database transaction
///
/// The state word is atomic because the lock manager wounds transactions
/// from other threads; the lock sets are only touched under the lock
/// manager's latch or by the owning thread.
pub struct Transaction {
    /// Transaction ID
    id: TxnId,

    /// Current transaction state
    state: AtomicU8,

    /// Isolation level for this transaction
    isolation_level: IsolationLevel,

    /// Records this transaction holds shared locks on
    shared_lock_set: Mutex<HashSet<Rid>>,

    /// Records this transaction holds exclusive locks on
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    /// Create a new transaction with the given ID, starting in the growing phase
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            state: AtomicU8::new(TransactionState::Growing as u8),
            isolation_level,
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    /// Get transaction ID
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Get transaction state
    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Set transaction state
    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Get transaction isolation level
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Records this transaction holds shared locks on
    pub fn shared_lock_set(&self) -> MutexGuard<'_, HashSet<Rid>> {
        self.shared_lock_set.lock()
    }

    /// Records this transaction holds exclusive locks on
    pub fn exclusive_lock_set(&self) -> MutexGuard<'_, HashSet<Rid>> {
        self.exclusive_lock_set.lock()
    }

    pub fn is_shared_locked(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    pub fn is_exclusive_locked(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }
}
