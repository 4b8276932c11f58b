//! Flow graph (§4.E): steps connected port-to-port forming a DAG, plus
//! activation order (leaves — i.e. steps with no upstream input, typically
//! source exchanges — first), ported from jogasaki's `model::graph` and the
//! `common::graph::topological_sort` helper its scheduler uses to drive
//! activation.

use sqlexec_helpers::{fatal, IndexMap};

use crate::step::{PortIndex, Step, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub step: StepId,
    pub port: PortIndex,
}

pub struct FlowGraph {
    steps: IndexMap<StepId, Step>,
    edges: Vec<(Endpoint, Endpoint)>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self { steps: IndexMap::default(), edges: Vec::new() }
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.insert(step.id(), step);
    }

    pub fn connect(&mut self, from: Endpoint, to: Endpoint) {
        self.edges.push((from, to));
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(&id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    fn upstream_count(&self, id: StepId) -> usize {
        self.edges.iter().filter(|(_, to)| to.step == id).count()
    }

    fn downstream_of(&self, id: StepId) -> impl Iterator<Item = StepId> + '_ {
        self.edges.iter().filter(move |(from, _)| from.step == id).map(|(_, to)| to.step)
    }

    /// Kahn's-algorithm topological order starting from steps with no
    /// upstream input (the "leaf exchanges" the orchestrator activates
    /// first per §4.J). Aborts — a wire/graph invariant violation, not a
    /// recoverable error — if the graph contains a cycle, since steps must
    /// form a DAG by construction.
    pub fn activation_order(&self) -> Vec<StepId> {
        let mut remaining_in_degree: IndexMap<StepId, usize> =
            self.steps.keys().map(|&id| (id, self.upstream_count(id))).collect();

        let mut ready: Vec<StepId> = remaining_in_degree.iter().filter(|&(_, &d)| d == 0).map(|(&id, _)| id).collect();
        ready.sort_by_key(|id| id.0);

        let mut order = Vec::with_capacity(self.steps.len());
        let mut queue = ready;
        while let Some(id) = queue.pop() {
            order.push(id);
            let mut newly_ready = Vec::new();
            for down in self.downstream_of(id) {
                if let Some(d) = remaining_in_degree.get_mut(&down) {
                    *d -= 1;
                    if *d == 0 {
                        newly_ready.push(down);
                    }
                }
            }
            newly_ready.sort_by_key(|id| id.0);
            queue.extend(newly_ready);
        }

        if order.len() != self.steps.len() {
            fatal!("flow graph contains a cycle: only {} of {} steps reachable", order.len(), self.steps.len());
        }
        order
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    fn ep(step: u64, port: usize) -> Endpoint {
        Endpoint { step: StepId(step), port: PortIndex(port) }
    }

    #[test]
    fn activation_order_visits_source_exchange_before_process() {
        let mut graph = FlowGraph::new();
        graph.add_step(Step::new(StepId(0), StepKind::ForwardExchange, 0, 1));
        graph.add_step(Step::new(StepId(1), StepKind::Process, 1, 1));
        graph.add_step(Step::new(StepId(2), StepKind::ForwardExchange, 1, 0));
        graph.connect(ep(0, 0), ep(1, 0));
        graph.connect(ep(1, 0), ep(2, 0));

        let order = graph.activation_order();
        assert_eq!(order, vec![StepId(0), StepId(1), StepId(2)]);
    }

    #[test]
    fn diamond_shaped_graph_respects_dependencies() {
        let mut graph = FlowGraph::new();
        for id in 0..4u64 {
            graph.add_step(Step::new(StepId(id), StepKind::Process, 1, 1));
        }
        graph.connect(ep(0, 0), ep(1, 0));
        graph.connect(ep(0, 0), ep(2, 0));
        graph.connect(ep(1, 0), ep(3, 0));
        graph.connect(ep(2, 0), ep(3, 0));

        let order = graph.activation_order();
        let pos = |id: u64| order.iter().position(|&s| s == StepId(id)).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
    }
}
