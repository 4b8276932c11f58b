//! Core-pinned work-stealing worker pool (§4.D), ported from jogasaki's
//! `scheduler::task_scheduler` / `scheduler::thread_params` pairing, built
//! on `crossbeam_deque`'s injector/worker/stealer trio the way most Rust
//! work-stealing runtimes compose it.
//!
//! Each worker owns a local FIFO deque plus a per-worker "inbox"
//! (`crossbeam_deque::Injector`, safe to push into from any thread) used for
//! `schedule_at` placement — a plain `Worker<T>` can only be pushed to by
//! its owning thread, so sticky cross-thread submission needs the inbox.
//! When a worker's local deque and inbox are both empty, it probes the other
//! workers' inboxes and local stealers in rotating order before backing off.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_deque::{Injector, Steal, Stealer, Worker as LocalQueue};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;

use crate::config::SchedulerConfig;

/// Identity of a schedulable unit of work, unique within whatever owns it
/// (a job, in the engine's case). Opaque to the scheduler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task ran to completion.
    Completed,
    /// The task suspended itself (durability wait, long-running commit).
    /// It will not be re-enqueued automatically: whoever owns the
    /// suspension list re-submits it later via `schedule_at`, preserving
    /// worker affinity.
    Suspended,
}

type BoxedTask = Box<dyn FnOnce(WorkerId) -> TaskOutcome + Send>;

struct ScheduledTask {
    id: TaskId,
    run: BoxedTask,
}

struct WorkerSlot {
    inbox: Injector<ScheduledTask>,
    stealer: Stealer<ScheduledTask>,
    load: AtomicUsize,
}

struct Inner {
    slots: Vec<WorkerSlot>,
    sticky: Mutex<std::collections::HashMap<TaskId, usize>>,
    shutdown: AtomicBool,
    next_id: AtomicU64,
}

impl Inner {
    fn least_loaded(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.load.load(Ordering::Relaxed))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn target_for(&self, id: TaskId) -> usize {
        self.sticky.lock().get(&id).copied().unwrap_or_else(|| self.least_loaded())
    }

    fn submit(&self, worker: usize, task: ScheduledTask) {
        self.slots[worker].inbox.push(task);
    }
}

/// Core-pinned, work-stealing thread pool. Tasks run to completion: there is
/// no cooperative yielding at the language level, only the explicit
/// suspend/resume protocol via [`TaskOutcome::Suspended`].
pub struct Scheduler {
    inner: Arc<Inner>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(config: SchedulerConfig) -> Self {
        let n = config.thread_count.max(1);
        let mut local_queues = Vec::with_capacity(n);
        let mut slots = Vec::with_capacity(n);
        for _ in 0..n {
            let q = LocalQueue::new_fifo();
            slots.push(WorkerSlot { inbox: Injector::new(), stealer: q.stealer(), load: AtomicUsize::new(0) });
            local_queues.push(q);
        }

        let inner = Arc::new(Inner {
            slots,
            sticky: Mutex::new(std::collections::HashMap::new()),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        });

        let core_ids = if config.core_affinity { core_affinity::get_core_ids().unwrap_or_default() } else { Vec::new() };

        let mut handles = Vec::with_capacity(n);
        for (idx, local) in local_queues.into_iter().enumerate() {
            let inner = Arc::clone(&inner);
            let core = if config.core_affinity && !core_ids.is_empty() {
                core_ids.get((config.initial_core + idx) % core_ids.len()).copied()
            } else {
                None
            };
            let builder = std::thread::Builder::new().name(format!("sqlexec-worker-{idx}"));
            let handle = builder
                .spawn(move || {
                    if let Some(core_id) = core {
                        core_affinity::set_for_current(core_id);
                    }
                    worker_loop(idx, local, inner);
                })
                .expect("spawn scheduler worker thread");
            handles.push(handle);
        }

        log::debug!("scheduler started with {n} worker(s), core_affinity={}", config.core_affinity);
        Self { inner, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Allocate a fresh task identity scoped to this scheduler.
    pub fn alloc_task_id(&self) -> TaskId {
        TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Place `task` on its sticky worker if one is recorded, else on the
    /// least-loaded worker (and record that choice as sticky for next time).
    pub fn schedule(&self, id: TaskId, task: impl FnOnce(WorkerId) -> TaskOutcome + Send + 'static) {
        let target = self.inner.target_for(id);
        self.inner.sticky.lock().insert(id, target);
        self.inner.submit(target, ScheduledTask { id, run: Box::new(task) });
    }

    /// Force placement on `worker`, used by operators that must remain on
    /// the same worker for cache/arena locality (transaction pinning,
    /// durability-wait continuations).
    pub fn schedule_at(&self, id: TaskId, worker: WorkerId, task: impl FnOnce(WorkerId) -> TaskOutcome + Send + 'static) {
        self.inner.sticky.lock().insert(id, worker.0);
        self.inner.submit(worker.0, ScheduledTask { id, run: Box::new(task) });
    }

    /// Drain queues and join every worker thread. Tasks already running
    /// complete; tasks still queued are run (not discarded) before their
    /// worker observes shutdown and exits. Waking suspended tasks with a
    /// cancellation code is the responsibility of whoever holds the
    /// suspension list (`sqlexec-txn`), since the scheduler itself never
    /// tracks suspended tasks.
    pub fn stop(mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

fn steal_loop<T>(source: impl Fn() -> Steal<T>) -> Option<T> {
    loop {
        match source() {
            Steal::Success(t) => return Some(t),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

fn find_task(idx: usize, local: &LocalQueue<ScheduledTask>, inner: &Inner) -> Option<ScheduledTask> {
    if let Some(t) = local.pop() {
        return Some(t);
    }
    if let Some(t) = steal_loop(|| inner.slots[idx].inbox.steal_batch_and_pop(local)) {
        return Some(t);
    }
    let n = inner.slots.len();
    for offset in 1..n {
        let target = (idx + offset) % n;
        if let Some(t) = steal_loop(|| inner.slots[target].stealer.steal_batch_and_pop(local)) {
            return Some(t);
        }
        if let Some(t) = steal_loop(|| inner.slots[target].inbox.steal_batch_and_pop(local)) {
            return Some(t);
        }
    }
    None
}

fn worker_loop(idx: usize, local: LocalQueue<ScheduledTask>, inner: Arc<Inner>) {
    let backoff = Backoff::new();
    loop {
        match find_task(idx, &local, &inner) {
            Some(task) => {
                inner.slots[idx].load.fetch_add(1, Ordering::Relaxed);
                log::trace!("worker {idx} running task {:?}", task.id);
                let outcome = (task.run)(WorkerId(idx));
                inner.slots[idx].load.fetch_sub(1, Ordering::Relaxed);
                log::trace!("worker {idx} finished task {:?}: {:?}", task.id, outcome);
                backoff.reset();
            }
            None => {
                if inner.shutdown.load(Ordering::Acquire) {
                    log::debug!("worker {idx} shutting down, queue drained");
                    return;
                }
                backoff.snooze();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn schedule_runs_task_to_completion() {
        let scheduler = Scheduler::start(SchedulerConfig { thread_count: 2, core_affinity: false, ..SchedulerConfig::default() });
        let (tx, rx) = mpsc::channel();
        let id = scheduler.alloc_task_id();
        scheduler.schedule(id, move |_worker| {
            tx.send(42).unwrap();
            TaskOutcome::Completed
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 42);
        scheduler.stop();
    }

    #[test]
    fn schedule_at_pins_to_requested_worker() {
        let scheduler = Scheduler::start(SchedulerConfig { thread_count: 4, core_affinity: false, ..SchedulerConfig::default() });
        let (tx, rx) = mpsc::channel();
        let id = scheduler.alloc_task_id();
        scheduler.schedule_at(id, WorkerId(2), move |worker| {
            tx.send(worker).unwrap();
            TaskOutcome::Completed
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), WorkerId(2));
        scheduler.stop();
    }

    #[test]
    fn sticky_schedule_reuses_previous_worker() {
        let scheduler = Scheduler::start(SchedulerConfig { thread_count: 8, core_affinity: false, ..SchedulerConfig::default() });
        let id = scheduler.alloc_task_id();
        let (tx1, rx1) = mpsc::channel();
        scheduler.schedule(id, move |w| {
            tx1.send(w).unwrap();
            TaskOutcome::Completed
        });
        let first = rx1.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

        let (tx2, rx2) = mpsc::channel();
        scheduler.schedule(id, move |w| {
            tx2.send(w).unwrap();
            TaskOutcome::Completed
        });
        let second = rx2.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(first, second);
        scheduler.stop();
    }

    #[test]
    fn many_tasks_all_complete_via_stealing() {
        let scheduler = Scheduler::start(SchedulerConfig { thread_count: 4, core_affinity: false, ..SchedulerConfig::default() });
        let (tx, rx) = mpsc::channel();
        for _ in 0..200 {
            let tx = tx.clone();
            let id = scheduler.alloc_task_id();
            scheduler.schedule(id, move |_| {
                tx.send(()).unwrap();
                TaskOutcome::Completed
            });
        }
        drop(tx);
        let mut count = 0;
        while rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok() {
            count += 1;
        }
        assert_eq!(count, 200);
        scheduler.stop();
    }
}
