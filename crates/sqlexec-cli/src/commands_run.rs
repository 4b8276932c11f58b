//! Backing for the `run` subcommand: seeds a table, submits a scan-and-emit
//! plan through the engine, and prints the decoded result stream. Stands in
//! for the plan compiler this crate deliberately does not carry (§1); a real
//! front-end would hand the engine a `CompiledPlan` built from a parsed
//! query instead of this fixed shape.

use std::sync::Arc;

use sqlexec_channel::{InMemoryChannel, RecordChannel};
use sqlexec_engine::{CompiledPlan, Engine, EngineConfig, Request, StepPlan};
use sqlexec_exchange::ExchangeRegistry;
use sqlexec_flow::{FlowGraph, Step, StepId, StepKind};
use sqlexec_ops::operators::emit::{EmitColumn, EmitOperator};
use sqlexec_ops::operators::scan::{ColumnBinding, ScanOperator};
use sqlexec_ops::OperatorKind;
use sqlexec_record::key::{self, NullsOrder, SortOrder};
use sqlexec_record::stream::{decode_row, StreamValue};
use sqlexec_record::{FieldType, RecordMeta};
use sqlexec_storage::{InMemoryStorage, ScanRange, Storage, TransactionMode, TransactionOptions, WriteKind};
use sqlexec_txn::TransactionContext;

use crate::commands::RunArgs;

const TABLE: &str = "demo_table";

fn encode_key(id: i32) -> Vec<u8> {
    let mut out = Vec::new();
    key::encode_null_prefix(&mut out, false, NullsOrder::First);
    key::encode_i32(&mut out, id, SortOrder::Ascending);
    out
}

fn encode_value(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    key::encode_null_prefix(&mut out, false, NullsOrder::First);
    key::encode_bytes(&mut out, name.as_bytes(), SortOrder::Ascending);
    out
}

fn seed(storage: &InMemoryStorage, rows: u32) {
    let tx = storage
        .open_transaction(TransactionMode::Occ, TransactionOptions::default())
        .expect("in-memory storage never fails to open a transaction");
    for id in 0..rows {
        storage.put(tx, TABLE, &encode_key(id as i32), &encode_value(&format!("row-{id}")), WriteKind::Insert);
    }
    storage.commit(tx, Box::new(|_marker| {}));
}

pub fn run(args: RunArgs) -> i32 {
    let storage = Arc::new(InMemoryStorage::new());
    seed(&storage, args.rows);

    let engine = Engine::start(EngineConfig::default(), Arc::clone(&storage) as Arc<dyn Storage>);
    let txn = match engine.begin_transaction(TransactionMode::Occ, TransactionOptions::default()) {
        Ok(txn) => txn,
        Err(info) => {
            eprintln!("failed to start transaction: {info}");
            engine.shutdown();
            return 1;
        }
    };

    let mut graph = FlowGraph::new();
    let step_id = StepId(0);
    graph.add_step(Step::new(step_id, StepKind::Process, 0, 0));

    let channel = InMemoryChannel::new();
    let channel_for_step = Arc::clone(&channel) as Arc<dyn RecordChannel>;
    let step_builder = move |_partition: usize, storage: &Arc<dyn Storage>, _exchanges: &Arc<ExchangeRegistry>, tx: Option<&Arc<TransactionContext>>| {
        let handle = tx.expect("demo scan runs inside a transaction").handle();
        let writer = channel_for_step.acquire(false).expect("acquire output writer");
        let emit = EmitOperator::new(
            vec![
                EmitColumn { variable_index: 0, field_type: FieldType::Int4 },
                EmitColumn { variable_index: 1, field_type: FieldType::Character { varying: true, length: None } },
            ],
            writer,
        );
        let scan = ScanOperator::new(
            Arc::clone(storage),
            handle,
            TABLE.to_string(),
            ScanRange::full(),
            vec![ColumnBinding { variable_index: 0, field_type: FieldType::Int4 }],
            vec![ColumnBinding { variable_index: 1, field_type: FieldType::Character { varying: true, length: None } }],
            Some(Box::new(OperatorKind::Emit(emit))),
        );
        OperatorKind::Scan(scan)
    };
    let plan = CompiledPlan::new(graph, vec![StepPlan::new(step_id, 1, step_builder)], Vec::new());

    let root_meta = RecordMeta::new(
        vec![FieldType::Int4, FieldType::Character { varying: true, length: None }],
        vec![false, false],
    );
    let request = Request { plan, transaction: Some(Arc::clone(&txn)), root_variables_meta: root_meta };

    let (job_id, stats, error) = engine.submit(request);
    if let Some(info) = error {
        eprintln!("job {job_id:?} failed: {info}");
        engine.shutdown();
        return 1;
    }

    log::info!("job {job_id:?} completed in {:?} ({} task(s))", stats.elapsed, stats.tasks_executed);
    for bytes in channel.rows() {
        let mut cursor = bytes.as_slice();
        let values = decode_row(&mut cursor);
        println!("{}", format_row(&values));
    }

    engine.shutdown();
    0
}

fn format_row(values: &[StreamValue]) -> String {
    values
        .iter()
        .map(|v| match v {
            StreamValue::Null => "NULL".to_string(),
            StreamValue::Int(i) => i.to_string(),
            StreamValue::Float4(f) => f.to_string(),
            StreamValue::Float8(f) => f.to_string(),
            StreamValue::Character(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => format!("{other:?}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
