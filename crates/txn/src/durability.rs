//! Durability waitlist (§4.H/§8 invariant 5), ported from jogasaki's
//! `scheduler::durability_manager` — a priority queue of transactions
//! waiting for the KV store's durability marker to catch up to the marker
//! their commit was assigned.
//!
//! `check_cancel` is the supplemented feature from `durability_manager.cpp`
//! (§ "Supplemented features" in this workspace's expanded spec): it scans
//! the waitlist and completes, with cancellation, any entry whose response
//! handle reports the request was cancelled — resolving the otherwise-open
//! question of "cancel vs. pending commit" in cancellation's favor.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use parking_lot::Mutex;

use sqlexec_storage::DurabilityMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Durable,
    Cancelled,
}

/// Per-waiter cancellation signal, implemented by whatever owns the
/// client-facing response handle (§6: "a non-blocking `check_cancel` call").
pub trait CancelCheck: Send {
    fn is_cancel_requested(&self) -> bool;
}

type Completion = Box<dyn FnOnce(WaitOutcome) + Send>;

struct Entry {
    tx_surrogate_id: u64,
    job_id: u64,
    marker: DurabilityMarker,
    completion: Completion,
    cancel_handle: Box<dyn CancelCheck>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.marker == other.marker
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.marker.cmp(&other.marker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitlistSnapshot {
    pub tx_surrogate_id: u64,
    pub job_id: u64,
    pub marker: DurabilityMarker,
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    current_marker: DurabilityMarker,
}

/// Single process-wide min-heap keyed by marker (§5: "a coarse `in-use`
/// flag"), guarded here by a plain mutex since entries are small and
/// commit/durability events are infrequent relative to per-row work.
#[derive(Default)]
pub struct DurabilityWaitlist {
    inner: Mutex<Inner>,
}

impl DurabilityWaitlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_marker(&self) -> DurabilityMarker {
        self.inner.lock().current_marker
    }

    /// Enqueue a transaction waiting for `marker`; `completion` is invoked
    /// exactly once, either when the marker becomes durable or the wait is
    /// cancelled.
    pub fn wait_for(
        &self,
        tx_surrogate_id: u64,
        job_id: u64,
        marker: DurabilityMarker,
        cancel_handle: Box<dyn CancelCheck>,
        completion: Completion,
    ) {
        let mut inner = self.inner.lock();
        if marker <= inner.current_marker {
            drop(inner);
            completion(WaitOutcome::Durable);
            return;
        }
        inner.heap.push(Reverse(Entry { tx_surrogate_id, job_id, marker, completion, cancel_handle }));
    }

    /// For every waiting entry whose marker is `<= m`, invoke its
    /// completion exactly once and remove it from the heap (§8 invariant 5).
    pub fn update_current_marker(&self, m: DurabilityMarker) {
        let mut inner = self.inner.lock();
        if m > inner.current_marker {
            inner.current_marker = m;
        }
        let mut ready = Vec::new();
        while let Some(Reverse(entry)) = inner.heap.peek() {
            if entry.marker > inner.current_marker {
                break;
            }
            let Reverse(entry) = inner.heap.pop().expect("just peeked");
            ready.push(entry);
        }
        drop(inner);
        for entry in ready {
            (entry.completion)(WaitOutcome::Durable);
        }
    }

    /// Fast path used when the caller already knows no one is waiting:
    /// bump the marker directly. Falls back to the full scan in
    /// [`Self::update_current_marker`] when the heap is non-empty, since a
    /// stale emptiness check would otherwise leave ready waiters stuck.
    pub fn instant_update_if_waitlist_empty(&self, m: DurabilityMarker) {
        let is_empty = {
            let mut inner = self.inner.lock();
            if inner.heap.is_empty() {
                if m > inner.current_marker {
                    inner.current_marker = m;
                }
                true
            } else {
                false
            }
        };
        if !is_empty {
            self.update_current_marker(m);
        }
    }

    /// Scan the heap and complete, with cancellation, any entry whose
    /// handle reports the request was cancelled — even one whose marker
    /// would otherwise become durable on the very next `update_current_marker`.
    pub fn check_cancel(&self) {
        let mut inner = self.inner.lock();
        let all: Vec<Entry> = std::mem::take(&mut inner.heap).into_iter().map(|Reverse(e)| e).collect();
        let (cancelled, remaining): (Vec<_>, Vec<_>) = all.into_iter().partition(|e| e.cancel_handle.is_cancel_requested());
        inner.heap = remaining.into_iter().map(Reverse).collect();
        drop(inner);
        for entry in cancelled {
            (entry.completion)(WaitOutcome::Cancelled);
        }
    }

    /// Non-destructive snapshot of every waiting entry, for the engine's
    /// diagnostics surface.
    pub fn diagnostics(&self) -> Vec<WaitlistSnapshot> {
        self.inner
            .lock()
            .heap
            .iter()
            .map(|Reverse(e)| WaitlistSnapshot { tx_surrogate_id: e.tx_surrogate_id, job_id: e.job_id, marker: e.marker })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    struct NeverCancel;
    impl CancelCheck for NeverCancel {
        fn is_cancel_requested(&self) -> bool {
            false
        }
    }

    struct FlagCancel(Arc<AtomicBool>);
    impl CancelCheck for FlagCancel {
        fn is_cancel_requested(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn update_current_marker_completes_every_entry_at_or_below_marker() {
        let waitlist = DurabilityWaitlist::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for (tx, marker) in [(1u64, 5u64), (2, 3), (3, 10)] {
            let seen = Arc::clone(&seen);
            waitlist.wait_for(tx, 0, marker, Box::new(NeverCancel), Box::new(move |outcome| seen.lock().unwrap().push((tx, marker, outcome))));
        }
        waitlist.update_current_marker(5);
        let got = seen.lock().unwrap().clone();
        assert_eq!(got, vec![(2, 3, WaitOutcome::Durable), (1, 5, WaitOutcome::Durable)]);
        assert_eq!(waitlist.diagnostics().len(), 1);
    }

    #[test]
    fn instant_update_bumps_marker_directly_when_empty() {
        let waitlist = DurabilityWaitlist::new();
        waitlist.instant_update_if_waitlist_empty(7);
        assert_eq!(waitlist.current_marker(), 7);
    }

    #[test]
    fn check_cancel_completes_only_flagged_entries() {
        let waitlist = DurabilityWaitlist::new();
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(StdMutex::new(Vec::new()));

        {
            let seen = Arc::clone(&seen);
            waitlist.wait_for(1, 0, 100, Box::new(FlagCancel(Arc::clone(&flag))), Box::new(move |o| seen.lock().unwrap().push((1, o))));
        }
        {
            let seen = Arc::clone(&seen);
            waitlist.wait_for(2, 0, 100, Box::new(NeverCancel), Box::new(move |o| seen.lock().unwrap().push((2, o))));
        }

        flag.store(true, Ordering::Relaxed);
        waitlist.check_cancel();

        let got = seen.lock().unwrap().clone();
        assert_eq!(got, vec![(1, WaitOutcome::Cancelled)]);
        assert_eq!(waitlist.diagnostics().len(), 1);
    }

    #[test]
    fn wait_for_marker_already_durable_completes_immediately() {
        let waitlist = DurabilityWaitlist::new();
        waitlist.update_current_marker(10);
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = Arc::clone(&seen);
        waitlist.wait_for(1, 0, 5, Box::new(NeverCancel), Box::new(move |o| *seen2.lock().unwrap() = Some(o)));
        assert_eq!(*seen.lock().unwrap(), Some(WaitOutcome::Durable));
    }
}
