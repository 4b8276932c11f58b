//! Worker pinning (§3/§4.H): the first task to enter a transaction context
//! records its worker; every subsequent task for that transaction is
//! `schedule_at`-pinned to the same worker for arena/cache locality. The
//! use-count that guards this lives in [`crate::termination::TerminationState`]
//! (task_use_count); this struct just remembers *which* worker.

use parking_lot::Mutex;
use sqlexec_scheduler::WorkerId;

#[derive(Default)]
pub struct WorkerPinning {
    worker: Mutex<Option<WorkerId>>,
}

impl WorkerPinning {
    pub fn new() -> Self {
        Self::default()
    }

    /// First task in wins and records `candidate`; later callers observe the
    /// same worker regardless of which worker they'd otherwise have run on.
    pub fn enter(&self, candidate: WorkerId) -> WorkerId {
        let mut slot = self.worker.lock();
        *slot.get_or_insert(candidate)
    }

    pub fn current(&self) -> Option<WorkerId> {
        *self.worker.lock()
    }

    /// Released only once the owning transaction's use-count reaches zero
    /// (checked by the caller, `TransactionContext::exit_task`).
    pub fn release(&self) {
        *self.worker.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_task_in_wins() {
        let pinning = WorkerPinning::new();
        assert_eq!(pinning.enter(WorkerId(3)), WorkerId(3));
        assert_eq!(pinning.enter(WorkerId(7)), WorkerId(3));
    }

    #[test]
    fn worker_id_is_empty_before_any_task_enters() {
        let pinning = WorkerPinning::new();
        assert_eq!(pinning.current(), None);
        pinning.enter(WorkerId(1));
        assert_eq!(pinning.current(), Some(WorkerId(1)));
        pinning.release();
        assert_eq!(pinning.current(), None);
    }
}
