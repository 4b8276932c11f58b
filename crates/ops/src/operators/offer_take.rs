//! Offer and take operators (§4.F), ported from jogasaki's
//! `executor::process::impl_::ops::{offer, take_flat}`: the boundary between
//! a step's own operator tree and the shuffle exchange that carries its rows
//! to the next step. `offer` pushes the currently bound row into an
//! exchange's input partition; `take` pulls each record of a forward
//! exchange's output partition back into a fresh variable table block.
//!
//! Group and aggregate exchanges are read back by their own dedicated
//! operators ([`crate::operators::join`], [`crate::operators::aggregate`])
//! rather than through `take`, since cogroup and merge/finalize need more
//! structure than "pull the next record".

use std::sync::Arc;

use sqlexec_arena::ArenaPtr;
use sqlexec_containers::IterableRecordStore;
use sqlexec_exchange::{AggregateInputPartition, ExchangeRegistry, ForwardPartition, GroupInputPartition};
use sqlexec_flow::StepId;

use crate::context::OperatorContext;
use crate::operator::{Operator, OperatorKind, OperatorResult};

/// The exchange input partition one task's `offer` operator owns for the
/// span of its run. Carries its own partition index for the forward and
/// group cases, where the downstream side needs to find it again (a forward
/// partition by its matching index, a group partition among every upstream
/// task's deposit before the exchange is flushed).
pub enum OfferTarget {
    Forward { partition_index: usize, partition: ForwardPartition },
    Group { partition_index: usize, partition: GroupInputPartition },
    Aggregate(AggregateInputPartition),
}

/// Pushes the row bound in the current variable table block into whichever
/// exchange input partition this step feeds. On `close`, hands that
/// partition's finished contents to the job's [`ExchangeRegistry`] under the
/// exchange step's own identity — the registry is what lets the downstream
/// step's reader find it once every offering task has finished.
pub struct OfferOperator {
    registry: Arc<ExchangeRegistry>,
    step: StepId,
    target: Option<OfferTarget>,
}

impl OfferOperator {
    pub fn new(registry: Arc<ExchangeRegistry>, step: StepId, target: OfferTarget) -> Self {
        Self { registry, step, target: Some(target) }
    }
}

impl Operator for OfferOperator {
    fn open(&mut self, _ctx: &mut OperatorContext) {}

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        let (variables, scratch) = ctx.variables_and_scratch();
        let record = variables.current().record();
        match self.target.as_mut().expect("offer target consumed before close") {
            OfferTarget::Forward { partition, .. } => partition.writer().write(&record, &*scratch),
            OfferTarget::Group { partition, .. } => partition.push(&record, &*scratch),
            OfferTarget::Aggregate(partition) => partition.combine(&record),
        }
        OperatorResult::HasMore
    }

    fn close(&mut self, _ctx: &mut OperatorContext) {
        match self.target.take().expect("offer operator closed twice") {
            OfferTarget::Forward { partition_index, partition } => {
                self.registry.deposit_forward(self.step, partition_index, partition)
            }
            OfferTarget::Group { partition_index, partition } => self.registry.deposit_group(self.step, partition_index, partition),
            OfferTarget::Aggregate(partition) => self.registry.deposit_aggregate(self.step, partition.into_partials()),
        }
    }
}

/// Reads every record of a forward exchange's output partition back into
/// the current variable table block, in the order the exchange stored them,
/// driving downstream once per record.
pub struct TakeOperator {
    store: IterableRecordStore,
    order: Vec<ArenaPtr>,
    position: usize,
    downstream: Option<Box<OperatorKind>>,
}

impl TakeOperator {
    pub fn new(partition: ForwardPartition, downstream: Option<Box<OperatorKind>>) -> Self {
        let store = partition.into_store();
        let order = store.iter().collect();
        Self { store, order, position: 0, downstream }
    }
}

impl Operator for TakeOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        if self.position >= self.order.len() {
            return OperatorResult::Eof;
        }
        let ptr = self.order[self.position];
        self.position += 1;

        let checkpoint = ctx.checkpoint_scratch();
        {
            let (variables, scratch) = ctx.variables_and_scratch();
            let mut dst = variables.current().record();
            self.store.copy_into(ptr, &mut dst, scratch);
        }
        if let Some(downstream) = &mut self.downstream {
            downstream.process_row(ctx);
        }
        ctx.rewind_scratch(checkpoint);
        OperatorResult::HasMore
    }

    fn close(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.close(ctx);
        }
    }
}
