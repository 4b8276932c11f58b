//! Step-state table (§4.E), ported from jogasaki's `scheduler::step_state`.
//! Tracks, per step, a map from task identity to its lifecycle state, split
//! into a *pre* pool (partitioning/setup tasks) and a *main* pool. A step is
//! *prepared* once every pre task has completed and *completed* once every
//! main task has completed.

use sqlexec_helpers::IndexMap;

use crate::task::{FlowTaskId, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Error,
}

/// A task identity's slot before any state has been recorded for it. Used
/// only internally to distinguish "never reserved" from "reserved but not
/// yet created", so `register` can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Uninitialized,
    State(TaskState),
}

#[derive(Default)]
pub struct StepStateTable {
    pre: IndexMap<FlowTaskId, Slot>,
    main: IndexMap<FlowTaskId, Slot>,
}

impl StepStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for `id` ahead of the task actually being created, so
    /// that `prepared`/`completed` checks can account for tasks whose count
    /// isn't known at activation time. Reserving twice is a no-op.
    pub fn reserve(&mut self, kind: TaskKind, id: FlowTaskId) {
        self.pool_mut(kind).entry(id).or_insert(Slot::Uninitialized);
    }

    /// Register `id` as created, transitioning its slot from
    /// `Uninitialized` (or absent) to `Created`.
    ///
    /// # Panics
    /// Registering into a slot that already holds a non-uninitialized state
    /// is a programming error (double registration of the same task
    /// identity).
    pub fn register(&mut self, kind: TaskKind, id: FlowTaskId) {
        let pool = self.pool_mut(kind);
        match pool.get(&id) {
            None | Some(Slot::Uninitialized) => {
                pool.insert(id, Slot::State(TaskState::Created));
            }
            Some(Slot::State(existing)) => {
                panic!("registering task {id:?} into non-uninitialized slot (already {existing:?})");
            }
        }
    }

    pub fn set_state(&mut self, kind: TaskKind, id: FlowTaskId, state: TaskState) {
        let pool = self.pool_mut(kind);
        pool.insert(id, Slot::State(state));
    }

    pub fn state(&self, kind: TaskKind, id: FlowTaskId) -> Option<TaskState> {
        match self.pool(kind).get(&id) {
            Some(Slot::State(s)) => Some(*s),
            _ => None,
        }
    }

    fn pool(&self, kind: TaskKind) -> &IndexMap<FlowTaskId, Slot> {
        match kind {
            TaskKind::Pre => &self.pre,
            TaskKind::Main => &self.main,
        }
    }

    fn pool_mut(&mut self, kind: TaskKind) -> &mut IndexMap<FlowTaskId, Slot> {
        match kind {
            TaskKind::Pre => &mut self.pre,
            TaskKind::Main => &mut self.main,
        }
    }

    fn all_completed(pool: &IndexMap<FlowTaskId, Slot>) -> bool {
        !pool.is_empty() && pool.values().all(|s| matches!(s, Slot::State(TaskState::Completed)))
    }

    pub fn prepared(&self) -> bool {
        Self::all_completed(&self.pre)
    }

    pub fn completed(&self) -> bool {
        Self::all_completed(&self.main)
    }

    pub fn has_error(&self) -> bool {
        self.pre.values().chain(self.main.values()).any(|s| matches!(s, Slot::State(TaskState::Error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_scheduler::TaskId;

    fn tid(n: u64) -> FlowTaskId {
        FlowTaskId { scheduler_id: TaskId(n), partition: 0 }
    }

    #[test]
    fn completed_is_false_until_every_main_task_completes() {
        let mut table = StepStateTable::new();
        table.register(TaskKind::Main, tid(0));
        table.register(TaskKind::Main, tid(1));
        assert!(!table.completed());
        table.set_state(TaskKind::Main, tid(0), TaskState::Completed);
        assert!(!table.completed());
        table.set_state(TaskKind::Main, tid(1), TaskState::Completed);
        assert!(table.completed());
    }

    #[test]
    fn prepared_tracks_pre_pool_independent_of_main() {
        let mut table = StepStateTable::new();
        table.register(TaskKind::Pre, tid(0));
        table.register(TaskKind::Main, tid(1));
        table.set_state(TaskKind::Pre, tid(0), TaskState::Completed);
        assert!(table.prepared());
        assert!(!table.completed());
    }

    #[test]
    fn reserved_slot_can_be_registered_once() {
        let mut table = StepStateTable::new();
        table.reserve(TaskKind::Main, tid(5));
        table.register(TaskKind::Main, tid(5));
        assert_eq!(table.state(TaskKind::Main, tid(5)), Some(TaskState::Created));
    }

    #[test]
    #[should_panic(expected = "non-uninitialized slot")]
    fn registering_twice_panics() {
        let mut table = StepStateTable::new();
        table.register(TaskKind::Main, tid(0));
        table.register(TaskKind::Main, tid(0));
    }

    #[test]
    fn empty_pool_is_neither_prepared_nor_completed() {
        let table = StepStateTable::new();
        assert!(!table.prepared());
        assert!(!table.completed());
    }
}
