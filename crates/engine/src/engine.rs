//! Request orchestrator (§4.J), the engine's sole public entry point.
//! Ported from jogasaki's `api::impl_::database`/`scheduler::dag_controller`
//! pairing: a request carries a compiled plan, a target transaction, and an
//! output channel; the orchestrator allocates a job, builds and activates
//! the plan's steps in flow-graph order, waits for completion, then drives
//! commit or abort and reports statistics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use sqlexec_arena::PagePool;
use sqlexec_channel::{ErrorCode, ErrorInfo, ErrorSlot};
use sqlexec_exchange::ExchangeRegistry;
use sqlexec_flow::{Flow, FlowTaskId, TaskKind};
use sqlexec_ops::{run_to_completion, OperatorContext, VariableTable};
use sqlexec_record::RecordMeta;
use sqlexec_scheduler::{Scheduler, TaskOutcome};
use sqlexec_storage::{Storage, TransactionHandle, TransactionMode, TransactionOptions};
use sqlexec_txn::{map_status_to_error, CommitIntent, DurabilityWaitlist, TransactionContext};

use crate::config::EngineConfig;
use crate::job::{Job, JobId, JobIdAllocator, JobStatistics, StepBarrier};
use crate::plan::{CompiledPlan, ExchangePlan};

/// Everything one call to [`Engine::submit`] needs (§4.J "a request
/// carries: a compiled plan, the target transaction handle, a parameter
/// set, and an output channel"). The parameter set itself is the compiled
/// plan's problem — by the time a plan reaches the orchestrator, every
/// parameter has already been substituted into the operator tree the
/// plan's builders close over. Likewise the output channel: a step's
/// builder acquires its own writer from whichever [`sqlexec_channel::RecordChannel`]
/// it closes over (an emit operator at the tail of its operator tree),
/// rather than the orchestrator routing rows through a channel of its own.
pub struct Request {
    pub plan: CompiledPlan,
    pub transaction: Option<Arc<TransactionContext>>,
    pub root_variables_meta: RecordMeta,
}

/// Table metadata the engine can hand back to a `describe` request (S8).
/// A stand-in for the catalog a real compiler front-end owns: this engine
/// only needs enough of one to resolve storage names and answer `describe`.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub storage_name: String,
    pub meta: RecordMeta,
}

pub struct Engine {
    config: EngineConfig,
    scheduler: Scheduler,
    storage: Arc<dyn Storage>,
    durability: Arc<DurabilityWaitlist>,
    job_ids: JobIdAllocator,
    scratch_pool: Arc<PagePool>,
    tx_surrogate_ids: AtomicU64,
    catalog: Mutex<HashMap<String, TableInfo>>,
}

impl Engine {
    pub fn start(config: EngineConfig, storage: Arc<dyn Storage>) -> Self {
        let scheduler = Scheduler::start(config.scheduler_config());
        log::info!("engine started: thread_count={}, default_partitions={}", config.thread_count, config.default_partitions);
        Self {
            config,
            scheduler,
            storage,
            durability: Arc::new(DurabilityWaitlist::new()),
            job_ids: JobIdAllocator::default(),
            scratch_pool: Arc::new(PagePool::new(1 << 16)),
            tx_surrogate_ids: AtomicU64::new(1),
            catalog: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn durability(&self) -> &Arc<DurabilityWaitlist> {
        &self.durability
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Registers a table's storage name and row metadata so later
    /// `describe` calls (and, in a fuller catalog, plan compilation) can
    /// resolve it. Not part of §4.J itself — the plan compiler owns the
    /// catalog in production — but this engine has no other catalog to
    /// lean on, so it carries the minimal piece `describe` needs.
    pub fn register_table(&self, name: impl Into<String>, info: TableInfo) {
        self.catalog.lock().insert(name.into(), info);
    }

    /// Supplemented feature: `describe(table_name)` (S8). Returns the
    /// registered table's info, or `target_not_found_exception` naming the
    /// table when it isn't registered.
    pub fn describe(&self, table_name: &str) -> Result<TableInfo, ErrorInfo> {
        self.catalog
            .lock()
            .get(table_name)
            .cloned()
            .ok_or_else(|| ErrorInfo::new(ErrorCode::TargetNotFoundException, format!("table not found: {table_name}")))
    }

    /// Opens a transaction against the configured storage and wraps it in a
    /// [`TransactionContext`], assigning the next surrogate id this engine
    /// instance hands out.
    pub fn begin_transaction(&self, mode: TransactionMode, options: TransactionOptions) -> Result<Arc<TransactionContext>, ErrorInfo> {
        let handle = self
            .storage
            .open_transaction(mode, options)
            .map_err(|status| map_status_to_error(status).unwrap_or_else(|| ErrorInfo::new(ErrorCode::InternalException, "failed to open transaction")))?;
        let surrogate_id = self.tx_surrogate_ids.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(TransactionContext::new(surrogate_id, handle, mode)))
    }

    /// §4.J steps 1-6: allocate a job, build and activate the plan's steps
    /// in flow-graph order, wait for each step's tasks before moving to the
    /// next, then commit or abort the transaction and report statistics.
    ///
    /// Every step's operator tree shares one job-scoped [`ExchangeRegistry`]:
    /// a process step's `offer` leaf deposits its finished partition into it
    /// when its task's tree closes, and once the barrier for that step has
    /// been cleared, an exchange step with no task of its own is flushed
    /// (merged/finalized/sorted) before the next step's builders run and
    /// pull the result back out. This is what lets a multi-step shuffle,
    /// group-by, or join plan actually move rows between steps instead of
    /// dropping each step's exchange partitions on the floor when its tasks
    /// finish.
    pub fn submit(&self, request: Request) -> (JobId, JobStatistics, Option<ErrorInfo>) {
        let job_id = self.job_ids.alloc();
        let mut job = Job::new(job_id);
        log::debug!("job {job_id:?} allocated");

        let job_errors = Arc::new(ErrorSlot::new());
        let exchanges = Arc::new(ExchangeRegistry::new());
        let order = request.plan.graph.activation_order();

        for step_id in order {
            if job_errors.is_set() {
                log::debug!("job {job_id:?}: error already recorded, skipping remaining steps");
                break;
            }
            let Some(step_plan) = request.plan.step_plan(step_id) else {
                match request.plan.exchange_plan(step_id) {
                    Some(ExchangePlan::Forward) | None => {
                        // Forward exchanges need no merge (N:N pass-through);
                        // a step absent from both `steps` and `exchanges` is
                        // a flow-graph node with nothing left to do here.
                    }
                    Some(ExchangePlan::Group { meta, key_field_count }) => {
                        exchanges.flush_group(step_id, meta.clone(), *key_field_count);
                    }
                    Some(ExchangePlan::Aggregate { columns }) => {
                        exchanges.flush_aggregate(step_id, columns.clone());
                    }
                }
                continue;
            };
            let partitions = step_plan.partitions;
            let barrier = Arc::new(StepBarrier::new(partitions));
            let mut flow = Flow::new(step_id, partitions);

            for partition in 0..partitions {
                let builder = Arc::clone(&step_plan.builder);
                let storage = Arc::clone(&self.storage);
                let exchanges = Arc::clone(&exchanges);
                let transaction = request.transaction.clone();
                let root_meta = request.root_variables_meta.clone();
                let scratch_pool = Arc::clone(&self.scratch_pool);
                let barrier = Arc::clone(&barrier);
                let job_errors = Arc::clone(&job_errors);

                let task_id = self.scheduler.alloc_task_id();
                flow.register_task(TaskKind::Main, FlowTaskId { scheduler_id: task_id, partition });

                self.scheduler.schedule(task_id, move |worker| {
                    let outcome = (|| {
                        if let Some(txn) = &transaction {
                            if txn.enter_task(worker).is_err() {
                                return Some(ErrorInfo::new(ErrorCode::InactiveTransactionException, "transaction is terminating"));
                            }
                        }
                        let root_table = VariableTable::new(root_meta);
                        let mut ctx = OperatorContext::new(Arc::clone(&scratch_pool), root_table, transaction.clone());
                        let mut root = builder.build(partition, &storage, &exchanges, transaction.as_ref());
                        run_to_completion(&mut root, &mut ctx);
                        if let Some(txn) = &transaction {
                            txn.exit_task();
                        }
                        ctx.error()
                    })();
                    if let Some(info) = outcome {
                        job_errors.set(info);
                    }
                    barrier.task_done();
                    TaskOutcome::Completed
                });
            }

            barrier.wait();
            flow.activate();
            job.statistics.tasks_executed += partitions as u64;
        }

        let error = job_errors.get().or_else(|| request.transaction.as_ref().and_then(|txn| txn.error_slot().get()));

        if let Some(txn) = &request.transaction {
            if error.is_some() {
                self.abort_transaction(txn);
            } else {
                self.commit_transaction(txn);
            }
        }

        job.finish();
        log::debug!("job {job_id:?} completed: {:?} task(s), error={:?}", job.statistics.tasks_executed, error.as_ref().map(|e| e.code));
        (job.id, job.statistics, error)
    }

    /// Drives commit: requests it on the transaction, silently following a
    /// downgrade to abort (§4.H, in-flight tasks at the moment of the
    /// request), otherwise blocks on the storage commit callback and feeds
    /// the resulting durability marker into the waitlist.
    fn commit_transaction(&self, txn: &Arc<TransactionContext>) {
        match txn.request_commit() {
            CommitIntent::AlreadyTerminating => return,
            CommitIntent::DowngradedToAbort => {
                self.finish_abort(txn);
                return;
            }
            CommitIntent::CommitRecorded => {}
        }
        let durability = Arc::clone(&self.durability);
        let txn_for_marker = Arc::clone(txn);
        let status = self.storage.commit(
            txn.handle(),
            Box::new(move |marker| {
                txn_for_marker.set_durability_marker(marker);
                txn_for_marker.mark_committed();
                durability.instant_update_if_waitlist_empty(marker);
            }),
        );
        if !status.is_ok() {
            if let Some(info) = map_status_to_error(status) {
                txn.set_error(info);
            }
            txn.mark_aborted();
        }
    }

    fn abort_transaction(&self, txn: &Arc<TransactionContext>) {
        txn.request_abort();
        self.finish_abort(txn);
    }

    fn finish_abort(&self, txn: &Arc<TransactionContext>) {
        let status = self.storage.abort(txn.handle());
        if !status.is_ok() {
            log::warn!("abort of transaction {:?} reported non-ok status: {status:?}", txn.handle());
        }
        txn.mark_aborted();
    }

    /// Shuts down the worker pool. Queued tasks run to completion first
    /// (the scheduler's own contract); callers should only call this once
    /// every job they care about has already completed.
    pub fn shutdown(self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_channel::{InMemoryChannel, RecordChannel};
    use sqlexec_flow::{FlowGraph, Step, StepId, StepKind};
    use sqlexec_ops::operators::emit::EmitOperator;
    use sqlexec_ops::operators::scan::ScanOperator;
    use sqlexec_ops::OperatorKind;
    use sqlexec_record::FieldType;
    use sqlexec_storage::{EndpointKind, InMemoryStorage, ScanRange, WriteKind};

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4], vec![false])
    }

    #[test]
    fn describe_unregistered_table_reports_target_not_found() {
        let engine = Engine::start(EngineConfig::default(), Arc::new(InMemoryStorage::new()));
        let err = engine.describe("no_such_table").unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetNotFoundException);
        assert!(err.message.contains("no_such_table"));
        engine.shutdown();
    }

    #[test]
    fn describe_registered_table_returns_its_info() {
        let engine = Engine::start(EngineConfig::default(), Arc::new(InMemoryStorage::new()));
        engine.register_table("t", TableInfo { storage_name: "t".into(), meta: meta() });
        let info = engine.describe("t").unwrap();
        assert_eq!(info.storage_name, "t");
        engine.shutdown();
    }

    #[test]
    fn submit_runs_a_single_scan_step_and_commits() {
        let storage = Arc::new(InMemoryStorage::new());
        let setup_tx = storage.open_transaction(TransactionMode::Occ, TransactionOptions::default()).unwrap();
        let _ = storage.put(setup_tx, "t", b"k0", b"v0", WriteKind::Insert);
        let _ = storage.commit(setup_tx, Box::new(|_marker| {}));

        let engine = Engine::start(EngineConfig { thread_count: 2, ..EngineConfig::default() }, Arc::clone(&storage) as Arc<dyn Storage>);
        let txn = engine.begin_transaction(TransactionMode::Occ, TransactionOptions::default()).unwrap();

        let mut graph = FlowGraph::new();
        let step_id = StepId(0);
        graph.add_step(Step::new(step_id, StepKind::Process, 0, 0));

        let channel = InMemoryChannel::new();
        let channel_for_builder = Arc::clone(&channel) as Arc<dyn RecordChannel>;
        let builder = move |_partition: usize, storage: &Arc<dyn Storage>, _exchanges: &Arc<ExchangeRegistry>, tx: Option<&Arc<TransactionContext>>| {
            let handle = tx.expect("scan step requires a transaction").handle();
            let writer = channel_for_builder.acquire(false).expect("acquire output writer");
            let emit = EmitOperator::new(Vec::new(), writer);
            let scan = ScanOperator::new(
                Arc::clone(storage),
                handle,
                "t".into(),
                ScanRange { low: Vec::new(), low_kind: EndpointKind::Unbound, high: Vec::new(), high_kind: EndpointKind::Unbound },
                Vec::new(),
                Vec::new(),
                Some(Box::new(OperatorKind::Emit(emit))),
            );
            OperatorKind::Scan(scan)
        };
        let plan = crate::plan::CompiledPlan::new(graph, vec![crate::plan::StepPlan::new(step_id, 1, builder)], Vec::new());

        let request = Request { plan, transaction: Some(Arc::clone(&txn)), root_variables_meta: meta() };
        let (_job_id, stats, error) = engine.submit(request);
        assert!(error.is_none(), "unexpected error: {error:?}");
        assert_eq!(stats.tasks_executed, 1);
        assert_eq!(txn.commit_state(), sqlexec_txn::CommitState::Committed);
        engine.shutdown();
    }

    /// Exercises the three-step scan -> aggregate-exchange -> aggregate/emit
    /// shape (a group-less `SUM`, standing in for S5): step 0's `offer`
    /// deposits its partials into the registry, the orchestrator flushes the
    /// exchange step in between, and step 2's `AggregateOperator` reads the
    /// finalized group back out and emits it. Nothing here works unless
    /// `submit` actually carries the exchange registry across the barrier
    /// between steps 0 and 2.
    #[test]
    fn submit_runs_a_scan_aggregate_exchange_emit_plan() {
        use sqlexec_exchange::{AggregateColumn, AggregateInputPartition, AggregatorKind};
        use sqlexec_ops::operators::aggregate::{AggregateOperator, AggregateResultBinding};
        use sqlexec_ops::operators::offer_take::{OfferOperator, OfferTarget};
        use sqlexec_record::key::{self, NullsOrder, SortOrder};

        fn encode_id(id: i32) -> Vec<u8> {
            let mut out = Vec::new();
            key::encode_null_prefix(&mut out, false, NullsOrder::First);
            key::encode_i32(&mut out, id, SortOrder::Ascending);
            out
        }

        fn encode_amount(amount: i64) -> Vec<u8> {
            let mut out = Vec::new();
            key::encode_null_prefix(&mut out, false, NullsOrder::First);
            key::encode_i64(&mut out, amount, SortOrder::Ascending);
            out
        }

        let root_meta = RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false]);

        let storage = Arc::new(InMemoryStorage::new());
        let setup_tx = storage.open_transaction(TransactionMode::Occ, TransactionOptions::default()).unwrap();
        for (id, amount) in [(0, 10i64), (1, 20), (2, 30)] {
            let _ = storage.put(setup_tx, "agg_t", &encode_id(id), &encode_amount(amount), WriteKind::Insert);
        }
        let _ = storage.commit(setup_tx, Box::new(|_marker| {}));

        let engine = Engine::start(EngineConfig { thread_count: 2, ..EngineConfig::default() }, Arc::clone(&storage) as Arc<dyn Storage>);
        let txn = engine.begin_transaction(TransactionMode::Occ, TransactionOptions::default()).unwrap();

        let scan_step = StepId(0);
        let exchange_step = StepId(1);
        let emit_step = StepId(2);

        let mut graph = FlowGraph::new();
        graph.add_step(Step::new(scan_step, StepKind::Process, 0, 1));
        graph.add_step(Step::new(exchange_step, StepKind::AggregateExchange, 1, 1));
        graph.add_step(Step::new(emit_step, StepKind::Process, 1, 0));
        graph.connect(
            sqlexec_flow::Endpoint { step: scan_step, port: sqlexec_flow::PortIndex(0) },
            sqlexec_flow::Endpoint { step: exchange_step, port: sqlexec_flow::PortIndex(0) },
        );
        graph.connect(
            sqlexec_flow::Endpoint { step: exchange_step, port: sqlexec_flow::PortIndex(0) },
            sqlexec_flow::Endpoint { step: emit_step, port: sqlexec_flow::PortIndex(0) },
        );

        let columns = vec![AggregateColumn { source_field: 1, kind: AggregatorKind::Sum }];

        let scan_columns = columns.clone();
        let scan_root_meta = root_meta.clone();
        let scan_builder = move |_partition: usize, storage: &Arc<dyn Storage>, exchanges: &Arc<ExchangeRegistry>, tx: Option<&Arc<TransactionContext>>| {
            let handle = tx.expect("scan step requires a transaction").handle();
            let partition = AggregateInputPartition::new(scan_root_meta.clone(), 0, scan_columns.clone());
            let offer = OfferOperator::new(Arc::clone(exchanges), exchange_step, OfferTarget::Aggregate(partition));
            let scan = ScanOperator::new(
                Arc::clone(storage),
                handle,
                "agg_t".into(),
                ScanRange { low: Vec::new(), low_kind: EndpointKind::Unbound, high: Vec::new(), high_kind: EndpointKind::Unbound },
                vec![sqlexec_ops::operators::scan::ColumnBinding { variable_index: 0, field_type: FieldType::Int4 }],
                vec![sqlexec_ops::operators::scan::ColumnBinding { variable_index: 1, field_type: FieldType::Int8 }],
                Some(Box::new(OperatorKind::Offer(offer))),
            );
            OperatorKind::Scan(scan)
        };

        let channel = InMemoryChannel::new();
        let channel_for_builder = Arc::clone(&channel) as Arc<dyn RecordChannel>;
        let emit_builder = move |_partition: usize, _storage: &Arc<dyn Storage>, exchanges: &Arc<ExchangeRegistry>, _tx: Option<&Arc<TransactionContext>>| {
            let groups = exchanges.take_aggregate_groups(exchange_step);
            let writer = channel_for_builder.acquire(false).expect("acquire output writer");
            let emit = EmitOperator::new(vec![sqlexec_ops::operators::emit::EmitColumn { variable_index: 1, field_type: FieldType::Int8 }], writer);
            let aggregate = AggregateOperator::new(
                groups,
                Vec::new(),
                vec![AggregateResultBinding { variable_index: 1, field_type: FieldType::Int8 }],
                Some(Box::new(OperatorKind::Emit(emit))),
            );
            OperatorKind::Aggregate(aggregate)
        };

        let plan = crate::plan::CompiledPlan::new(
            graph,
            vec![crate::plan::StepPlan::new(scan_step, 1, scan_builder), crate::plan::StepPlan::new(emit_step, 1, emit_builder)],
            vec![(exchange_step, crate::plan::ExchangePlan::Aggregate { columns })],
        );

        let request = Request { plan, transaction: Some(Arc::clone(&txn)), root_variables_meta: root_meta };
        let (_job_id, stats, error) = engine.submit(request);
        assert!(error.is_none(), "unexpected error: {error:?}");
        assert_eq!(stats.tasks_executed, 2);

        let rows = channel.rows();
        assert_eq!(rows.len(), 1);
        let mut cursor = rows[0].as_slice();
        let values = sqlexec_record::stream::decode_row(&mut cursor);
        assert_eq!(values, vec![sqlexec_record::stream::StreamValue::Int(60)]);

        engine.shutdown();
    }
}
