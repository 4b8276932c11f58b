//! Compiled plan (§4.J item 2 "operator-builder walks the plan"): the seam
//! between the external plan compiler (explicitly out of scope, §1) and
//! this crate. A plan is a materialized [`FlowGraph`] plus, for each step
//! the graph names, a factory that builds one operator tree per partition —
//! ported in shape from jogasaki's `plan::compiler_context` handing the
//! runtime a `model::graph` it only walks, never constructs itself.

use std::sync::Arc;

use sqlexec_exchange::{AggregateColumn, ExchangeRegistry};
use sqlexec_flow::{FlowGraph, StepId};
use sqlexec_ops::OperatorKind;
use sqlexec_record::RecordMeta;
use sqlexec_storage::Storage;
use sqlexec_txn::TransactionContext;

/// Builds one step's operator tree for one partition, given the resolved
/// storage handle, the job's exchange registry (so an `offer`/`take`/join/
/// aggregate leaf can deposit into or read back from whichever exchange
/// steps this step borders), and (if this step runs inside a transaction)
/// the transaction context. A plain closure satisfies this via the blanket
/// impl below; the trait exists so a plan can carry builders of different
/// concrete closure types in one `Vec`.
pub trait OperatorBuilder: Send + Sync {
    fn build(
        &self,
        partition: usize,
        storage: &Arc<dyn Storage>,
        exchanges: &Arc<ExchangeRegistry>,
        transaction: Option<&Arc<TransactionContext>>,
    ) -> OperatorKind;
}

impl<F> OperatorBuilder for F
where
    F: Fn(usize, &Arc<dyn Storage>, &Arc<ExchangeRegistry>, Option<&Arc<TransactionContext>>) -> OperatorKind + Send + Sync,
{
    fn build(
        &self,
        partition: usize,
        storage: &Arc<dyn Storage>,
        exchanges: &Arc<ExchangeRegistry>,
        transaction: Option<&Arc<TransactionContext>>,
    ) -> OperatorKind {
        self(partition, storage, exchanges, transaction)
    }
}

/// What the orchestrator must do at an exchange step's activation — there is
/// no task to schedule for it (§4.J: exchange steps have no worker of their
/// own), only a merge to perform once every upstream task feeding it has
/// completed and deposited into the registry.
pub enum ExchangePlan {
    /// N:N pass-through; nothing to merge. Carried only so `submit` can tell
    /// the step apart from one with no [`ExchangePlan`] at all (a process
    /// step) and skip it without special-casing "no-op" at every call site.
    Forward,
    Group { meta: RecordMeta, key_field_count: usize },
    Aggregate { columns: Vec<AggregateColumn> },
}

/// One step's contribution to the plan: how many partitions it runs (one
/// task per partition, §3 "Step / task identity") and the builder that
/// materializes each partition's operator tree.
pub struct StepPlan {
    pub id: StepId,
    pub partitions: usize,
    pub builder: Arc<dyn OperatorBuilder>,
}

impl StepPlan {
    pub fn new(id: StepId, partitions: usize, builder: impl OperatorBuilder + 'static) -> Self {
        Self { id, partitions: partitions.max(1), builder: Arc::new(builder) }
    }
}

/// A request's compiled plan: the step graph plus a builder for every step
/// that actually schedules a task. A step present in `graph` but absent
/// from `steps` (e.g. a leaf exchange whose input partitions are populated
/// entirely by its upstream process step's `offer` operator, never by a
/// task of its own) is simply skipped by the orchestrator.
pub struct CompiledPlan {
    pub graph: FlowGraph,
    pub steps: Vec<StepPlan>,
    pub exchanges: Vec<(StepId, ExchangePlan)>,
}

impl CompiledPlan {
    pub fn new(graph: FlowGraph, steps: Vec<StepPlan>, exchanges: Vec<(StepId, ExchangePlan)>) -> Self {
        Self { graph, steps, exchanges }
    }

    pub fn step_plan(&self, id: StepId) -> Option<&StepPlan> {
        self.steps.iter().find(|plan| plan.id == id)
    }

    pub fn exchange_plan(&self, id: StepId) -> Option<&ExchangePlan> {
        self.exchanges.iter().find(|(step, _)| *step == id).map(|(_, plan)| plan)
    }
}
