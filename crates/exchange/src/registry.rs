//! Per-job exchange registry (§4.E/§4.G/§4.J): the connective tissue an
//! exchange step's upstream `offer` tasks and its downstream reader task
//! share, keyed by the exchange step's own identity. Ported in shape from
//! how jogasaki's `scheduler::dag_controller` hands a flow's exchange
//! object to both the process step that feeds it and the one that reads
//! it back — here made explicit as a registry object rather than a shared
//! pointer baked into the flow graph, since this workspace's orchestrator
//! (`sqlexec_engine::Engine::submit`) treats each step as its own
//! synchronization point (§4.J's `StepBarrier`) and needs a place to hold
//! an exchange's state in the gap between one step's barrier and the next
//! step's activation.
//!
//! One instance lives for the span of a single job. An upstream task
//! deposits its finished partition (or, for the aggregate exchange, its
//! finished partials) when its `offer` operator closes; the orchestrator
//! then calls the matching `flush_*` once every upstream task for that
//! step has completed, and the downstream step's builder pulls the ready
//! reader or finalized rows back out exactly once.

use std::collections::HashMap;

use parking_lot::Mutex;

use sqlexec_flow::StepId;
use sqlexec_record::RecordMeta;

use crate::aggregate::{AggregateColumn, AggregateExchange, Partial};
use crate::forward::ForwardPartition;
use crate::group::{GroupExchange, GroupInputPartition, GroupReader};

#[derive(Default)]
pub struct ExchangeRegistry {
    forward: Mutex<HashMap<StepId, HashMap<usize, ForwardPartition>>>,
    group_deposits: Mutex<HashMap<StepId, Vec<(usize, GroupInputPartition)>>>,
    group_ready: Mutex<HashMap<StepId, GroupReader>>,
    aggregate_deposits: Mutex<HashMap<StepId, Vec<Vec<(Vec<u8>, Vec<Partial>)>>>>,
    aggregate_ready: Mutex<HashMap<StepId, Vec<(Vec<u8>, Vec<Option<f64>>)>>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits one upstream partition's finished forward output. A forward
    /// exchange is a pass-through (N sinks to N sources, §4.G): no merge is
    /// needed, `flush_forward` only moves ownership from this registry's
    /// staging map to its ready map so [`Self::take_forward`] can hand it to
    /// the matching downstream partition.
    pub fn deposit_forward(&self, step: StepId, partition_index: usize, partition: ForwardPartition) {
        self.forward.lock().entry(step).or_default().insert(partition_index, partition);
    }

    pub fn take_forward(&self, step: StepId, partition_index: usize) -> ForwardPartition {
        self.forward
            .lock()
            .get_mut(&step)
            .and_then(|partitions| partitions.remove(&partition_index))
            .unwrap_or_else(|| panic!("forward partition {partition_index} of exchange step {step:?} was never offered"))
    }

    pub fn deposit_group(&self, step: StepId, partition_index: usize, partition: GroupInputPartition) {
        self.group_deposits.lock().entry(step).or_default().push((partition_index, partition));
    }

    /// Gathers every input partition deposited for `step` (stable order by
    /// the upstream partition index they were offered from, though the
    /// group exchange's own sort makes that order immaterial to the
    /// result), assembles the exchange, and seals it into a [`GroupReader`]
    /// ready for [`Self::take_group_reader`].
    pub fn flush_group(&self, step: StepId, meta: RecordMeta, key_field_count: usize) {
        let mut deposited = self.group_deposits.lock().remove(&step).unwrap_or_default();
        deposited.sort_by_key(|(index, _)| *index);
        let partitions: Vec<GroupInputPartition> = deposited.into_iter().map(|(_, partition)| partition).collect();
        let reader = GroupExchange::from_partitions(meta, key_field_count, partitions).into_reader();
        self.group_ready.lock().insert(step, reader);
    }

    pub fn take_group_reader(&self, step: StepId) -> GroupReader {
        self.group_ready
            .lock()
            .remove(&step)
            .unwrap_or_else(|| panic!("group exchange step {step:?} was read before it was flushed"))
    }

    pub fn deposit_aggregate(&self, step: StepId, partials: Vec<(Vec<u8>, Vec<Partial>)>) {
        self.aggregate_deposits.lock().entry(step).or_default().push(partials);
    }

    /// Merges every upstream partition's partials sharing a group key and
    /// finalizes each column (§4.G "post-merge at the source computes the
    /// finals"), ready for [`Self::take_aggregate_groups`].
    pub fn flush_aggregate(&self, step: StepId, columns: Vec<AggregateColumn>) {
        let mut exchange = AggregateExchange::new(columns);
        for partials in self.aggregate_deposits.lock().remove(&step).unwrap_or_default() {
            exchange.merge_partition(partials);
        }
        self.aggregate_ready.lock().insert(step, exchange.finalize());
    }

    pub fn take_aggregate_groups(&self, step: StepId) -> Vec<(Vec<u8>, Vec<Option<f64>>)> {
        self.aggregate_ready
            .lock()
            .remove(&step)
            .unwrap_or_else(|| panic!("aggregate exchange step {step:?} was read before it was flushed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{ArenaResolve, FifoArena, LifoArena, PagePool};
    use sqlexec_containers::IterableRecordStore;
    use sqlexec_record::{FieldType, RecordRef};
    use std::sync::Arc;

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false])
    }

    fn new_store(meta: RecordMeta) -> IterableRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        IterableRecordStore::new(meta, LifoArena::new(pool.clone()), LifoArena::new(pool))
    }

    fn push(partition: &mut GroupInputPartition, meta: &RecordMeta, key: i32, value: i64, resolver: &dyn ArenaResolve) {
        let mut buf = vec![0u8; meta.record_size()];
        let mut r = RecordRef::new(&mut buf);
        r.set_value::<i32>(meta.value_offset(0), key);
        r.set_value::<i64>(meta.value_offset(1), value);
        partition.push(&r, resolver);
    }

    #[test]
    fn group_exchange_flushes_partitions_deposited_by_two_upstream_tasks() {
        let m = meta();
        let registry = ExchangeRegistry::new();
        let step = StepId(7);
        let resolver = FifoArena::new(Arc::new(PagePool::new(64)));

        let mut p0 = GroupInputPartition::new(new_store(m.clone()), 1);
        push(&mut p0, &m, 1, 10, &resolver);
        let mut p1 = GroupInputPartition::new(new_store(m.clone()), 1);
        push(&mut p1, &m, 1, 20, &resolver);

        registry.deposit_group(step, 1, p1);
        registry.deposit_group(step, 0, p0);
        registry.flush_group(step, m.clone(), 1);

        let mut reader = registry.take_group_reader(step);
        assert!(reader.next_group());
        assert_eq!(reader.get_group().get_value::<i32>(m.value_offset(0)), 1);
        let mut members = Vec::new();
        while reader.next_member() {
            members.push(reader.get_member().get_value::<i64>(m.value_offset(1)));
        }
        members.sort_unstable();
        assert_eq!(members, vec![10, 20]);
        assert!(!reader.next_group());
    }

    #[test]
    #[should_panic(expected = "was read before it was flushed")]
    fn taking_an_unflushed_group_exchange_panics() {
        let registry = ExchangeRegistry::new();
        registry.take_group_reader(StepId(1));
    }

    #[test]
    fn aggregate_exchange_merges_partials_from_every_deposit() {
        let registry = ExchangeRegistry::new();
        let step = StepId(3);
        let columns = vec![AggregateColumn { source_field: 1, kind: crate::aggregate::AggregatorKind::Sum }];

        registry.deposit_aggregate(step, vec![(b"k".to_vec(), vec![Partial::Sum(4.0)])]);
        registry.deposit_aggregate(step, vec![(b"k".to_vec(), vec![Partial::Sum(6.0)])]);
        registry.flush_aggregate(step, columns);

        let groups = registry.take_aggregate_groups(step);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, vec![Some(10.0)]);
    }

    #[test]
    fn forward_exchange_round_trips_a_single_partition() {
        let registry = ExchangeRegistry::new();
        let step = StepId(9);
        let partition = ForwardPartition::new(new_store(meta()));
        registry.deposit_forward(step, 0, partition);
        let taken = registry.take_forward(step, 0);
        assert_eq!(taken.count(), 0);
    }
}
