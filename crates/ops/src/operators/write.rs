//! Write operator (§4.F "write", §4.H), ported from jogasaki's
//! `executor::process::impl_::ops::write_kind`: encodes the key (and, unless
//! this is a delete, the value) bound in the current variable table block
//! and issues one `Storage::put` against the target index.
//!
//! Primary and secondary indices are both just storages to this operator —
//! a plan compiles one `WriteOperator` per index a statement must maintain,
//! chained through `downstream` so a single row's insert touches every index
//! in turn.

use sqlexec_record::key::{self, SortOrder};
use sqlexec_record::{Date, FieldType};
use sqlexec_storage::{Storage, TransactionHandle, WriteKind};

use crate::context::OperatorContext;
use crate::expr::EvalValue;
use crate::operator::{Operator, OperatorKind, OperatorResult};

/// One column bound into the key or value byte string this write encodes.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub variable_index: usize,
    pub field_type: FieldType,
}

pub struct WriteOperator {
    storage: std::sync::Arc<dyn Storage>,
    tx: TransactionHandle,
    storage_name: String,
    kind: WriteKind,
    key_columns: Vec<ColumnBinding>,
    /// Empty for `WriteKind::Delete`, which carries no value payload.
    value_columns: Vec<ColumnBinding>,
    downstream: Option<Box<OperatorKind>>,
}

impl WriteOperator {
    pub fn new(
        storage: std::sync::Arc<dyn Storage>,
        tx: TransactionHandle,
        storage_name: String,
        kind: WriteKind,
        key_columns: Vec<ColumnBinding>,
        value_columns: Vec<ColumnBinding>,
        downstream: Option<Box<OperatorKind>>,
    ) -> Self {
        Self { storage, tx, storage_name, kind, key_columns, value_columns, downstream }
    }

    fn encode_columns(&self, ctx: &mut OperatorContext, out: &mut Vec<u8>, columns: &[ColumnBinding]) {
        for col in columns {
            // `Date` has no `EvalValue` representation (§4.B is an
            // expression-evaluable subset); read it through the typed
            // accessor instead of `get_dynamic`.
            if col.field_type == FieldType::Date {
                let (variables, _) = ctx.variables_and_scratch();
                match variables.current().get::<Date>(col.variable_index) {
                    Some(Date(v)) => {
                        key::encode_null_prefix(out, false, key::NullsOrder::First);
                        key::encode_i32(out, v, SortOrder::Ascending);
                    }
                    None => key::encode_null_prefix(out, true, key::NullsOrder::First),
                }
                continue;
            }
            let (variables, scratch) = ctx.variables_and_scratch();
            let value = variables.current().get_dynamic(col.variable_index, &*scratch);
            let is_null = matches!(value, EvalValue::Null);
            key::encode_null_prefix(out, is_null, key::NullsOrder::First);
            if is_null {
                continue;
            }
            match (col.field_type, value) {
                (FieldType::Boolean, EvalValue::Boolean(b)) => key::encode_bool(out, b, SortOrder::Ascending),
                (FieldType::Int1, EvalValue::Int(i)) => key::encode_i8(out, i as i8, SortOrder::Ascending),
                (FieldType::Int2, EvalValue::Int(i)) => key::encode_i16(out, i as i16, SortOrder::Ascending),
                (FieldType::Int4, EvalValue::Int(i)) => key::encode_i32(out, i as i32, SortOrder::Ascending),
                (FieldType::Int8, EvalValue::Int(i)) => key::encode_i64(out, i, SortOrder::Ascending),
                (FieldType::Float4, EvalValue::Float(f)) => key::encode_f32(out, f as f32, SortOrder::Ascending),
                (FieldType::Float8, EvalValue::Float(f)) => key::encode_f64(out, f, SortOrder::Ascending),
                (FieldType::Character { .. } | FieldType::Octet { .. }, EvalValue::Character(bytes)) => {
                    key::encode_bytes(out, &bytes, SortOrder::Ascending);
                }
                (field_type, _) => panic!("write operator cannot encode column of type {field_type:?}"),
            }
        }
    }
}

impl Operator for WriteOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        let checkpoint = ctx.checkpoint_scratch();
        let mut key_bytes = Vec::new();
        self.encode_columns(ctx, &mut key_bytes, &self.key_columns);
        let mut value_bytes = Vec::new();
        if self.kind != WriteKind::Delete {
            self.encode_columns(ctx, &mut value_bytes, &self.value_columns);
        }

        let status = self.storage.put(self.tx, &self.storage_name, &key_bytes, &value_bytes, self.kind);
        if !status.is_ok() && !status.is_warning() {
            if let Some(info) = sqlexec_txn::map_status_to_error(status) {
                ctx.report_error(info);
            }
        } else if status.is_warning() {
            use sqlexec_channel::{ErrorCode, ErrorInfo};
            match (self.kind, status) {
                (WriteKind::Insert, sqlexec_storage::StatusCode::AlreadyExists) => {
                    ctx.report_error(ErrorInfo::new(ErrorCode::UniqueConstraintViolationException, "duplicate key on insert"));
                }
                (WriteKind::Update | WriteKind::Delete, sqlexec_storage::StatusCode::NotFound) => {
                    ctx.report_error(ErrorInfo::new(ErrorCode::TargetNotFoundException, "no such key"));
                }
                _ => {}
            }
        }

        if !ctx.has_error() {
            if let Some(downstream) = &mut self.downstream {
                downstream.process_row(ctx);
            }
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
