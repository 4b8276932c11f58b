//! Flow: per-step runtime state (§4.E/GLOSSARY), ported from jogasaki's
//! `model::flow`/`scheduler::flow`. Holds the tasks a step has created plus
//! its step-state table; owns its tasks exclusively, per the "cyclic
//! references" redesign note in the Design Notes (tasks hold only a step
//! identity, not a pointer back into their flow).

use crate::step::StepId;
use crate::step_state::StepStateTable;
use crate::task::{FlowTaskId, TaskKind};

pub struct Flow {
    step: StepId,
    partitions: usize,
    state: StepStateTable,
    tasks: Vec<FlowTaskId>,
    activated: bool,
}

impl Flow {
    pub fn new(step: StepId, partitions: usize) -> Self {
        Self { step, partitions, state: StepStateTable::new(), tasks: Vec::new(), activated: false }
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn activated(&self) -> bool {
        self.activated
    }

    /// Marks this flow activated. For exchange steps the caller sets up
    /// sinks/sources first and calls this once that's done; process steps
    /// call it once their upstream exchange is confirmed activated.
    pub fn activate(&mut self) {
        self.activated = true;
    }

    pub fn register_task(&mut self, kind: TaskKind, id: FlowTaskId) {
        self.state.register(kind, id);
        self.tasks.push(id);
    }

    pub fn tasks(&self) -> &[FlowTaskId] {
        &self.tasks
    }

    pub fn state(&self) -> &StepStateTable {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StepStateTable {
        &mut self.state
    }

    pub fn prepared(&self) -> bool {
        self.state.prepared()
    }

    pub fn completed(&self) -> bool {
        self.state.completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepId;
    use sqlexec_scheduler::TaskId;

    #[test]
    fn flow_starts_unactivated_with_no_tasks() {
        let flow = Flow::new(StepId(0), 4);
        assert!(!flow.activated());
        assert!(flow.tasks().is_empty());
    }

    #[test]
    fn registering_a_task_tracks_it_in_order() {
        let mut flow = Flow::new(StepId(1), 1);
        let t0 = FlowTaskId { scheduler_id: TaskId(0), partition: 0 };
        flow.register_task(TaskKind::Main, t0);
        assert_eq!(flow.tasks(), &[t0]);
    }
}
