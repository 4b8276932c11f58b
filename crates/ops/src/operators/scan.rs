//! Scan operator (§4.F "scan"), ported from jogasaki's
//! `executor::process::impl_::ops::scan`. Drives a storage range scan over
//! one index, decoding the current key/value pair into the bound variable
//! table block before pushing the row to its downstream operator.

use std::sync::Arc;

use sqlexec_record::key::{self, SortOrder};
use sqlexec_record::FieldType;
use sqlexec_storage::{ScanRange, Storage, TransactionHandle};

use crate::context::OperatorContext;
use crate::expr::EvalValue;
use crate::operator::{Operator, OperatorKind, OperatorResult};

/// One column's placement within a scan's key or value byte range: the
/// variable slot it decodes into and the declared type, which selects the
/// matching `sqlexec_record::key::decode_*` function.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub variable_index: usize,
    pub field_type: FieldType,
}

pub struct ScanOperator {
    storage: Arc<dyn Storage>,
    tx: TransactionHandle,
    storage_name: String,
    range: ScanRange,
    key_columns: Vec<ColumnBinding>,
    value_columns: Vec<ColumnBinding>,
    iter: Option<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>>,
    downstream: Option<Box<OperatorKind>>,
}

impl ScanOperator {
    pub fn new(
        storage: Arc<dyn Storage>,
        tx: TransactionHandle,
        storage_name: String,
        range: ScanRange,
        key_columns: Vec<ColumnBinding>,
        value_columns: Vec<ColumnBinding>,
        downstream: Option<Box<OperatorKind>>,
    ) -> Self {
        Self { storage, tx, storage_name, range, key_columns, value_columns, iter: None, downstream }
    }

    /// Decodes `bytes` (an order-preserving key encoding, or a plain
    /// concatenation for the value side) field by field into `columns`'
    /// bound variables.
    fn decode_columns(&self, ctx: &mut OperatorContext, bytes: &[u8], columns: &[ColumnBinding]) {
        let mut pos = 0;
        let (variables, scratch) = ctx.variables_and_scratch();
        let table = variables.current();
        for col in columns {
            let (is_null, consumed) = key::decode_null_prefix(&bytes[pos..]);
            pos += consumed;
            if is_null {
                table.set_null(col.variable_index);
                continue;
            }
            match col.field_type {
                FieldType::Boolean => {
                    let (v, n) = key::decode_bool(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<bool>(col.variable_index, v);
                }
                FieldType::Int1 => {
                    let (v, n) = key::decode_i8(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<i8>(col.variable_index, v);
                }
                FieldType::Int2 => {
                    let (v, n) = key::decode_i16(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<i16>(col.variable_index, v);
                }
                FieldType::Int4 => {
                    let (v, n) = key::decode_i32(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<i32>(col.variable_index, v);
                }
                FieldType::Int8 => {
                    let (v, n) = key::decode_i64(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<i64>(col.variable_index, v);
                }
                FieldType::Float4 => {
                    let (v, n) = key::decode_f32(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<f32>(col.variable_index, v);
                }
                FieldType::Float8 => {
                    let (v, n) = key::decode_f64(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<f64>(col.variable_index, v);
                }
                FieldType::Date => {
                    let (v, n) = key::decode_i32(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set::<sqlexec_record::Date>(col.variable_index, sqlexec_record::Date(v));
                }
                FieldType::Character { .. } | FieldType::Octet { .. } => {
                    let (v, n) = key::decode_bytes(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set_dynamic(col.variable_index, &EvalValue::Character(v), scratch);
                }
                other => panic!("scan cannot decode column of type {other:?}"),
            }
        }
    }
}

impl Operator for ScanOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        match self.storage.scan(self.tx, &self.storage_name, &self.range) {
            Ok(iter) => self.iter = Some(iter),
            Err(status) => {
                if let Some(info) = sqlexec_txn::map_status_to_error(status) {
                    ctx.report_error(info);
                }
                self.iter = Some(Box::new(std::iter::empty()));
            }
        }
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        let next = self.iter.as_mut().expect("scan operator not opened").next();
        match next {
            None => OperatorResult::Eof,
            Some((key_bytes, value_bytes)) => {
                // Scratch allocated while decoding this row (out-of-line
                // CHARACTER/OCTET payloads) and by every downstream operator
                // that projects a new varlen value is reclaimed in one shot
                // once the row has fully passed through the pipeline.
                let checkpoint = ctx.checkpoint_scratch();
                self.decode_columns(ctx, &key_bytes, &self.key_columns);
                self.decode_columns(ctx, &value_bytes, &self.value_columns);
                if let Some(downstream) = &mut self.downstream {
                    downstream.process_row(ctx);
                }
                ctx.rewind_scratch(checkpoint);
                OperatorResult::HasMore
            }
        }
    }

    fn close(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.close(ctx);
        }
    }
}
