//! Termination state (§3/§4.H): a single 64-bit atomic packing
//! `{task_use_count:62, going_to_commit:1, going_to_abort:1}`, ported from
//! jogasaki's `transaction_context`'s termination-state bitfield
//! (`request_context`/`transaction_context` commit/abort coordination).

use std::sync::atomic::{AtomicU64, Ordering};

const COUNT_BITS: u32 = 62;
const COUNT_MASK: u64 = (1u64 << COUNT_BITS) - 1;
const GOING_TO_COMMIT_BIT: u64 = 1 << 62;
const GOING_TO_ABORT_BIT: u64 = 1 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fields {
    task_use_count: u64,
    going_to_commit: bool,
    going_to_abort: bool,
}

fn unpack(bits: u64) -> Fields {
    Fields {
        task_use_count: bits & COUNT_MASK,
        going_to_commit: bits & GOING_TO_COMMIT_BIT != 0,
        going_to_abort: bits & GOING_TO_ABORT_BIT != 0,
    }
}

fn pack(f: Fields) -> u64 {
    (f.task_use_count & COUNT_MASK)
        | if f.going_to_commit { GOING_TO_COMMIT_BIT } else { 0 }
        | if f.going_to_abort { GOING_TO_ABORT_BIT } else { 0 }
}

/// What `try_set_going_to_commit` actually recorded: per §4.H, a commit
/// attempt against a transaction with in-flight tasks is silently turned
/// into an abort intent so those tasks observe it on their next use-count
/// increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitIntent {
    CommitRecorded,
    DowngradedToAbort,
    AlreadyTerminating,
}

pub struct TerminationState {
    bits: AtomicU64,
}

impl Default for TerminationState {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationState {
    pub fn new() -> Self {
        Self { bits: AtomicU64::new(0) }
    }

    pub fn task_use_count(&self) -> u64 {
        unpack(self.bits.load(Ordering::Acquire)).task_use_count
    }

    pub fn going_to_commit(&self) -> bool {
        unpack(self.bits.load(Ordering::Acquire)).going_to_commit
    }

    pub fn going_to_abort(&self) -> bool {
        unpack(self.bits.load(Ordering::Acquire)).going_to_abort
    }

    /// Fails if either terminate bit is set; otherwise increments the
    /// in-flight task count and returns `true`.
    pub fn try_increment_task_use_count(&self) -> bool {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            let f = unpack(current);
            if f.going_to_commit || f.going_to_abort {
                return false;
            }
            let next = pack(Fields { task_use_count: f.task_use_count + 1, ..f });
            if self.bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return true;
            }
        }
    }

    /// Always succeeds: decrements the in-flight task count.
    pub fn decrement_task_use_count(&self) {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            let f = unpack(current);
            debug_assert!(f.task_use_count > 0, "decrement below zero");
            let next = pack(Fields { task_use_count: f.task_use_count.saturating_sub(1), ..f });
            if self.bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return;
            }
        }
    }

    /// Succeeds unless either bit is already set. If tasks are in-flight at
    /// the moment of the attempt, the intent is downgraded to an abort so
    /// those tasks observe it.
    pub fn try_set_going_to_commit(&self) -> CommitIntent {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            let f = unpack(current);
            if f.going_to_commit || f.going_to_abort {
                return CommitIntent::AlreadyTerminating;
            }
            let downgrade = f.task_use_count > 0;
            let next = pack(Fields {
                going_to_commit: !downgrade,
                going_to_abort: downgrade,
                ..f
            });
            if self.bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return if downgrade { CommitIntent::DowngradedToAbort } else { CommitIntent::CommitRecorded };
            }
        }
    }

    /// Succeeds unless `going_to_abort` is already set; always wins over a
    /// pending (not yet terminal) commit intent.
    pub fn try_set_going_to_abort(&self) -> bool {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            let f = unpack(current);
            if f.going_to_abort {
                return false;
            }
            let next = pack(Fields { going_to_commit: false, going_to_abort: true, ..f });
            if self.bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_fails_once_terminating() {
        let state = TerminationState::new();
        assert_eq!(state.try_set_going_to_commit(), CommitIntent::CommitRecorded);
        assert!(!state.try_increment_task_use_count());
    }

    #[test]
    fn commit_downgrades_to_abort_with_in_flight_tasks() {
        let state = TerminationState::new();
        assert!(state.try_increment_task_use_count());
        assert_eq!(state.try_set_going_to_commit(), CommitIntent::DowngradedToAbort);
        assert!(state.going_to_abort());
        assert!(!state.going_to_commit());
    }

    #[test]
    fn abort_overrides_a_pending_commit_with_no_in_flight_tasks() {
        let state = TerminationState::new();
        assert_eq!(state.try_set_going_to_commit(), CommitIntent::CommitRecorded);
        assert!(state.going_to_commit());
        assert!(state.try_set_going_to_abort(), "abort must override a pending commit");
        assert!(state.going_to_abort());
        assert!(!state.going_to_commit());
    }

    #[test]
    fn abort_fails_once_abort_is_already_set() {
        let state = TerminationState::new();
        assert!(state.try_set_going_to_abort());
        assert!(!state.try_set_going_to_abort());
    }

    #[test]
    fn decrement_always_succeeds() {
        let state = TerminationState::new();
        state.try_increment_task_use_count();
        state.try_increment_task_use_count();
        state.decrement_task_use_count();
        assert_eq!(state.task_use_count(), 1);
    }
}
