//! Record-level lock manager: strict two-phase locking with wound-wait
//! deadlock prevention.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionRegistry;

/// Lock modes a transaction can hold on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One transaction's position in a record's lock queue
#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
    /// Cleared when an older transaction wounds this request
    valid: bool,
}

/// Per-record queue of lock requests.
///
/// Invariants: `exclusive` set implies `shared_count == 0`; `upgrading`
/// names the single transaction currently re-acquiring exclusivity.
#[derive(Debug, Default)]
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    shared_count: usize,
    exclusive: Option<TxnId>,
    upgrading: Option<TxnId>,
    cv: Arc<Condvar>,
}

impl LockRequestQueue {
    fn shared_grantable(&self) -> bool {
        self.exclusive.is_none()
    }

    fn exclusive_grantable(&self) -> bool {
        self.exclusive.is_none() && self.shared_count == 0
    }

    fn find_mut(&mut self, txn_id: TxnId) -> Option<&mut LockRequest> {
        self.requests.iter_mut().find(|r| r.txn_id == txn_id)
    }

    fn remove_request(&mut self, txn_id: TxnId) {
        if let Some(pos) = self.requests.iter().position(|r| r.txn_id == txn_id) {
            self.requests.remove(pos);
        }
    }
}

/// The lock manager serializes access to individual records.
///
/// One process-wide latch guards every queue; it is released only while a
/// requester sleeps on its queue's condition variable. Deadlocks are
/// prevented rather than detected: a requester wounds every younger
/// transaction whose queued request conflicts with its own, so an older
/// transaction never waits behind a younger one.
pub struct LockManager {
    latch: Mutex<HashMap<Rid, LockRequestQueue>>,
    registry: Arc<TransactionRegistry>,
}

impl LockManager {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Self {
            latch: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Acquire a shared lock on `rid`.
    ///
    /// Returns `Ok(false)` if the transaction was already aborted, and a
    /// typed abort if the request violates the locking protocol or the
    /// requester is wounded while waiting.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if !Self::check_acquire_phase(txn)? {
            return Ok(false);
        }

        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort {
                txn_id: txn.id(),
                reason: AbortReason::SharedOnReadUncommitted,
            });
        }

        let txn_id = txn.id();
        {
            let queue = table.entry(rid).or_default();
            queue.requests.push_back(LockRequest {
                txn_id,
                mode: LockMode::Shared,
                granted: false,
                valid: true,
            });
            self.wound_younger(queue, txn_id, LockMode::Shared);
        }

        loop {
            let queue = table.entry(rid).or_default();
            if txn.state() == TransactionState::Aborted || queue.shared_grantable() {
                break;
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
        }

        let queue = table.entry(rid).or_default();
        if txn.state() == TransactionState::Aborted {
            queue.remove_request(txn_id);
            queue.cv.notify_all();
            return Err(TransactionAbort {
                txn_id,
                reason: AbortReason::Deadlock,
            });
        }

        queue.shared_count += 1;
        if let Some(req) = queue.find_mut(txn_id) {
            req.granted = true;
        }
        txn.shared_lock_set().insert(rid);
        Ok(true)
    }

    /// Acquire an exclusive lock on `rid`.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if !Self::check_acquire_phase(txn)? {
            return Ok(false);
        }

        let txn_id = txn.id();
        {
            let queue = table.entry(rid).or_default();
            queue.requests.push_back(LockRequest {
                txn_id,
                mode: LockMode::Exclusive,
                granted: false,
                valid: true,
            });
            self.wound_younger(queue, txn_id, LockMode::Exclusive);
        }

        loop {
            let queue = table.entry(rid).or_default();
            if txn.state() == TransactionState::Aborted || queue.exclusive_grantable() {
                break;
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
        }

        let queue = table.entry(rid).or_default();
        if txn.state() == TransactionState::Aborted {
            queue.remove_request(txn_id);
            queue.cv.notify_all();
            return Err(TransactionAbort {
                txn_id,
                reason: AbortReason::Deadlock,
            });
        }

        queue.exclusive = Some(txn_id);
        if let Some(req) = queue.find_mut(txn_id) {
            req.granted = true;
        }
        txn.exclusive_lock_set().insert(rid);
        Ok(true)
    }

    /// Upgrade a held shared lock on `rid` to an exclusive lock.
    ///
    /// At most one transaction may be upgrading on a record at a time; a
    /// second concurrent upgrade aborts with `UpgradeConflict`.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if !Self::check_acquire_phase(txn)? {
            return Ok(false);
        }

        let txn_id = txn.id();
        {
            let queue = table.entry(rid).or_default();

            if queue.upgrading.is_some() {
                // The requester keeps its shared grant; rollback releases it
                txn.set_state(TransactionState::Aborted);
                return Err(TransactionAbort {
                    txn_id,
                    reason: AbortReason::UpgradeConflict,
                });
            }

            if queue.find_mut(txn_id).is_none() {
                // No shared lock held here; nothing to upgrade
                return Ok(false);
            }

            // Give up the shared grant and rewrite the queue entry in place.
            // From here on the entry behaves exactly like a fresh exclusive
            // request, including how wound walks treat it.
            queue.shared_count = queue.shared_count.saturating_sub(1);
            queue.upgrading = Some(txn_id);
            if let Some(req) = queue.find_mut(txn_id) {
                req.mode = LockMode::Exclusive;
                req.granted = false;
            }
            txn.shared_lock_set().remove(&rid);
            self.wound_younger(queue, txn_id, LockMode::Exclusive);
            queue.cv.notify_all();
        }

        loop {
            let queue = table.entry(rid).or_default();
            if txn.state() == TransactionState::Aborted || queue.exclusive_grantable() {
                break;
            }
            let cv = queue.cv.clone();
            cv.wait(&mut table);
        }

        let queue = table.entry(rid).or_default();
        if txn.state() == TransactionState::Aborted {
            queue.remove_request(txn_id);
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
            queue.cv.notify_all();
            return Err(TransactionAbort {
                txn_id,
                reason: AbortReason::Deadlock,
            });
        }

        queue.exclusive = Some(txn_id);
        queue.upgrading = None;
        if let Some(req) = queue.find_mut(txn_id) {
            req.granted = true;
        }
        txn.exclusive_lock_set().insert(rid);
        Ok(true)
    }

    /// Release the lock `txn` holds on `rid`.
    ///
    /// Returns `false` when no request for this transaction exists on the
    /// record, which makes rollback of a wounded transaction (whose failed
    /// request already removed itself) a clean no-op.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.latch.lock();
        let txn_id = txn.id();

        let queue = match table.get_mut(&rid) {
            Some(queue) => queue,
            None => {
                txn.shared_lock_set().remove(&rid);
                txn.exclusive_lock_set().remove(&rid);
                return false;
            }
        };

        let pos = match queue.requests.iter().position(|r| r.txn_id == txn_id) {
            Some(pos) => pos,
            None => {
                txn.shared_lock_set().remove(&rid);
                txn.exclusive_lock_set().remove(&rid);
                return false;
            }
        };

        let req = match queue.requests.remove(pos) {
            Some(req) => req,
            None => return false,
        };

        // A wounded entry's grant bookkeeping was already reversed
        if req.valid && req.granted {
            match req.mode {
                LockMode::Exclusive => queue.exclusive = None,
                LockMode::Shared => queue.shared_count = queue.shared_count.saturating_sub(1),
            }
        }

        // Two-phase transition: the first release ends the growing phase,
        // except READ_COMMITTED dropping a shared lock, which releases
        // eagerly without entering the shrinking phase.
        if txn.state() == TransactionState::Growing {
            let eager_shared_release = txn.isolation_level() == IsolationLevel::ReadCommitted
                && req.mode == LockMode::Shared;
            if !eager_shared_release {
                txn.set_state(TransactionState::Shrinking);
            }
        }

        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().remove(&rid);

        queue.cv.notify_all();
        true
    }

    /// Release every lock the transaction still holds, used by commit and
    /// rollback.
    pub fn release_all(&self, txn: &Transaction) {
        let exclusive: Vec<Rid> = txn.exclusive_lock_set().iter().copied().collect();
        let shared: Vec<Rid> = txn.shared_lock_set().iter().copied().collect();

        for rid in exclusive.into_iter().chain(shared) {
            self.unlock(txn, rid);
        }
    }

    /// Common acquire preconditions: already-aborted transactions fail
    /// quietly, shrinking transactions abort with `LockOnShrinking`.
    fn check_acquire_phase(txn: &Transaction) -> Result<bool, TransactionAbort> {
        match txn.state() {
            TransactionState::Aborted => Ok(false),
            TransactionState::Shrinking => {
                txn.set_state(TransactionState::Aborted);
                Err(TransactionAbort {
                    txn_id: txn.id(),
                    reason: AbortReason::LockOnShrinking,
                })
            }
            _ => Ok(true),
        }
    }

    /// Wound-wait: invalidate every younger queued request that conflicts
    /// with the requester's mode, reversing whatever bookkeeping the victim
    /// had contributed, and mark the victim transaction aborted.
    fn wound_younger(&self, queue: &mut LockRequestQueue, requester: TxnId, mode: LockMode) {
        let mut wounded = false;

        for req in queue.requests.iter_mut() {
            if req.txn_id <= requester || !req.valid {
                continue;
            }

            let conflicts = match mode {
                LockMode::Shared => req.mode == LockMode::Exclusive,
                LockMode::Exclusive => true,
            };
            if !conflicts {
                continue;
            }

            req.valid = false;
            if req.granted {
                match req.mode {
                    LockMode::Shared => {
                        queue.shared_count = queue.shared_count.saturating_sub(1);
                    }
                    LockMode::Exclusive => queue.exclusive = None,
                }
                req.granted = false;
            }
            if queue.upgrading == Some(req.txn_id) {
                queue.upgrading = None;
            }

            if let Some(victim) = self.registry.get(req.txn_id) {
                victim.set_state(TransactionState::Aborted);
            }
            debug!("txn {} wounded younger txn {}", requester, req.txn_id);
            wounded = true;
        }

        if wounded {
            queue.cv.notify_all();
        }
    }
}
