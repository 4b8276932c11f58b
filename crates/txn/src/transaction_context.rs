//! Transaction context (§3/§4.H): the engine-side state tracked for one
//! transaction across every task and operator that touches it, ported from
//! jogasaki's `transaction_context`.

use parking_lot::Mutex;
use sqlexec_channel::{ErrorInfo, ErrorSlot};
use sqlexec_scheduler::WorkerId;
use sqlexec_storage::{DurabilityMarker, TransactionHandle, TransactionMode};

use crate::termination::{CommitIntent, TerminationState};
use crate::worker_pinning::WorkerPinning;

/// A hold on a blob/clob pool entry (§3), kept alive for the duration of
/// the transaction that may still hand out a [`crate::reference_tag`] for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHold {
    pub provider: u8,
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Active,
    GoingToCommit,
    GoingToAbort,
    Committed,
    Aborted,
}

/// Failure returned by [`TransactionContext::enter_task`]: the transaction
/// is already terminating, so the caller's task must finish immediately
/// with whichever status its contract assigns to an inactive transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyTerminating;

pub struct TransactionContext {
    surrogate_id: u64,
    handle: TransactionHandle,
    mode: TransactionMode,
    error: ErrorSlot,
    termination: TerminationState,
    pinning: WorkerPinning,
    blob_holds: Mutex<Vec<BlobHold>>,
    durability_marker: Mutex<Option<DurabilityMarker>>,
    commit_state: Mutex<CommitState>,
}

impl TransactionContext {
    pub fn new(surrogate_id: u64, handle: TransactionHandle, mode: TransactionMode) -> Self {
        Self {
            surrogate_id,
            handle,
            mode,
            error: ErrorSlot::new(),
            termination: TerminationState::new(),
            pinning: WorkerPinning::new(),
            blob_holds: Mutex::new(Vec::new()),
            durability_marker: Mutex::new(None),
            commit_state: Mutex::new(CommitState::Active),
        }
    }

    pub fn surrogate_id(&self) -> u64 {
        self.surrogate_id
    }

    pub fn handle(&self) -> TransactionHandle {
        self.handle
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn error_slot(&self) -> &ErrorSlot {
        &self.error
    }

    /// First-writer-wins (§3/§8 invariant 8).
    pub fn set_error(&self, info: ErrorInfo) -> bool {
        self.error.set(info)
    }

    pub fn termination(&self) -> &TerminationState {
        &self.termination
    }

    /// Called when a task begins executing on behalf of this transaction:
    /// increments the use-count and records/confirms worker pinning. §8
    /// invariant 4: `worker_id = empty` iff `use_count = 0`, so pinning
    /// only ever changes together with the use-count transitioning away
    /// from zero.
    pub fn enter_task(&self, candidate: WorkerId) -> Result<WorkerId, AlreadyTerminating> {
        if !self.termination.try_increment_task_use_count() {
            return Err(AlreadyTerminating);
        }
        Ok(self.pinning.enter(candidate))
    }

    /// Called when a task finishes. Releases the worker pinning once the
    /// use-count returns to zero.
    pub fn exit_task(&self) {
        self.termination.decrement_task_use_count();
        if self.termination.task_use_count() == 0 {
            self.pinning.release();
        }
    }

    pub fn pinned_worker(&self) -> Option<WorkerId> {
        self.pinning.current()
    }

    /// Request commit. May be silently downgraded to an abort intent if
    /// tasks are still in-flight (§4.H).
    pub fn request_commit(&self) -> CommitIntent {
        let intent = self.termination.try_set_going_to_commit();
        let mut state = self.commit_state.lock();
        *state = match intent {
            CommitIntent::CommitRecorded => CommitState::GoingToCommit,
            CommitIntent::DowngradedToAbort => CommitState::GoingToAbort,
            CommitIntent::AlreadyTerminating => *state,
        };
        intent
    }

    /// Request abort. Always wins over a pending commit that hasn't yet
    /// reached a terminal state.
    pub fn request_abort(&self) -> bool {
        let won = self.termination.try_set_going_to_abort();
        if won {
            *self.commit_state.lock() = CommitState::GoingToAbort;
        }
        won
    }

    pub fn mark_committed(&self) {
        *self.commit_state.lock() = CommitState::Committed;
    }

    pub fn mark_aborted(&self) {
        *self.commit_state.lock() = CommitState::Aborted;
    }

    pub fn commit_state(&self) -> CommitState {
        *self.commit_state.lock()
    }

    /// §4.I propagation rule: a write after the transaction has started
    /// terminating is rejected outright.
    pub fn is_active(&self) -> bool {
        !self.termination.going_to_commit() && !self.termination.going_to_abort()
    }

    pub fn set_durability_marker(&self, marker: DurabilityMarker) {
        *self.durability_marker.lock() = Some(marker);
    }

    pub fn durability_marker(&self) -> Option<DurabilityMarker> {
        *self.durability_marker.lock()
    }

    pub fn hold_blob(&self, hold: BlobHold) {
        self.blob_holds.lock().push(hold);
    }

    pub fn blob_holds(&self) -> Vec<BlobHold> {
        self.blob_holds.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TransactionContext {
        TransactionContext::new(1, TransactionHandle(1), TransactionMode::Occ)
    }

    #[test]
    fn worker_id_is_empty_iff_use_count_zero() {
        let ctx = ctx();
        assert_eq!(ctx.pinned_worker(), None);
        ctx.enter_task(WorkerId(2)).unwrap();
        assert_eq!(ctx.pinned_worker(), Some(WorkerId(2)));
        ctx.exit_task();
        assert_eq!(ctx.pinned_worker(), None);
    }

    #[test]
    fn second_task_reuses_first_tasks_worker() {
        let ctx = ctx();
        ctx.enter_task(WorkerId(5)).unwrap();
        assert_eq!(ctx.enter_task(WorkerId(9)).unwrap(), WorkerId(5));
    }

    #[test]
    fn entering_a_terminating_transaction_fails() {
        let ctx = ctx();
        ctx.request_commit();
        assert!(ctx.enter_task(WorkerId(0)).is_err());
    }

    #[test]
    fn write_after_abort_is_inactive() {
        let ctx = ctx();
        assert!(ctx.is_active());
        ctx.request_abort();
        assert!(!ctx.is_active());
    }
}
