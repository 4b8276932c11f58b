//! Aggregate operator (§4.F "aggregate", §4.G), the read-back half of an
//! incremental aggregate exchange: [`crate::operators::offer_take::OfferOperator`]
//! (through `OfferTarget::Aggregate`) feeds `sqlexec_exchange::AggregateInputPartition::combine`
//! on the build side of the step graph; once every input partition's partials
//! have been merged and finalized (`AggregateExchange::merge_partition` /
//! `finalize`, driven by the engine between step activations, §4.E), this
//! operator walks the finalized `(group_key_bytes, per_column_value)` pairs
//! and binds each group's key and aggregate results into the current
//! variable table block, one group per `process_row` call.

use sqlexec_record::key::{self, SortOrder};
use sqlexec_record::FieldType;

use crate::context::OperatorContext;
use crate::expr::EvalValue;
use crate::operator::{Operator, OperatorKind, OperatorResult};

/// One group-key column: where in the encoded key bytes it sits (implicitly,
/// by position in `key_columns`) and which variable/type it decodes into.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub variable_index: usize,
    pub field_type: FieldType,
}

/// One finalized aggregate column: the variable it's written into and the
/// declared type of that variable, which decides how the `f64`/`None`
/// finalized value is narrowed and whether NULL is legal there.
#[derive(Debug, Clone, Copy)]
pub struct AggregateResultBinding {
    pub variable_index: usize,
    pub field_type: FieldType,
}

pub struct AggregateOperator {
    groups: Vec<(Vec<u8>, Vec<Option<f64>>)>,
    position: usize,
    key_columns: Vec<ColumnBinding>,
    result_columns: Vec<AggregateResultBinding>,
    downstream: Option<Box<OperatorKind>>,
}

impl AggregateOperator {
    pub fn new(
        groups: Vec<(Vec<u8>, Vec<Option<f64>>)>,
        key_columns: Vec<ColumnBinding>,
        result_columns: Vec<AggregateResultBinding>,
        downstream: Option<Box<OperatorKind>>,
    ) -> Self {
        Self { groups, position: 0, key_columns, result_columns, downstream }
    }

    fn decode_key(&self, ctx: &mut OperatorContext, bytes: &[u8]) {
        let mut pos = 0;
        let (variables, scratch) = ctx.variables_and_scratch();
        let table = variables.current();
        for col in &self.key_columns {
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
                FieldType::Character { .. } | FieldType::Octet { .. } => {
                    let (v, n) = key::decode_bytes(&bytes[pos..], SortOrder::Ascending);
                    pos += n;
                    table.set_dynamic(col.variable_index, &EvalValue::Character(v), scratch);
                }
                other => panic!("aggregate group key cannot decode column of type {other:?}"),
            }
        }
    }

    fn write_results(&self, ctx: &mut OperatorContext, values: &[Option<f64>]) {
        let (variables, scratch) = ctx.variables_and_scratch();
        let table = variables.current();
        for (col, value) in self.result_columns.iter().zip(values) {
            match value {
                None => table.set_null(col.variable_index),
                Some(v) => match col.field_type {
                    FieldType::Int1 | FieldType::Int2 | FieldType::Int4 | FieldType::Int8 => {
                        table.set_dynamic(col.variable_index, &EvalValue::Int(*v as i64), scratch);
                    }
                    FieldType::Float4 | FieldType::Float8 => {
                        table.set_dynamic(col.variable_index, &EvalValue::Float(*v), scratch);
                    }
                    other => panic!("aggregate result cannot be written to column of type {other:?}"),
                },
            }
        }
    }
}

impl Operator for AggregateOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        if self.position >= self.groups.len() {
            return OperatorResult::Eof;
        }
        let (key_bytes, values) = self.groups[self.position].clone();
        self.position += 1;

        let checkpoint = ctx.checkpoint_scratch();
        self.decode_key(ctx, &key_bytes);
        self.write_results(ctx, &values);
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
