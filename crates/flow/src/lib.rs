//! Step/flow dataflow graph (§4.E), ported from jogasaki's `model` and
//! `scheduler::flow` namespaces: steps connected port-to-port forming a DAG,
//! each with per-step runtime state (its tasks and step-state table), plus
//! the leaves-first activation order the orchestrator drives.

pub mod flow;
pub mod graph;
pub mod step;
pub mod step_state;
pub mod task;

pub use flow::Flow;
pub use graph::{Endpoint, FlowGraph};
pub use step::{PortIndex, Step, StepId, StepKind};
pub use step_state::{StepStateTable, TaskState};
pub use task::{FlowTaskId, TaskKind};
