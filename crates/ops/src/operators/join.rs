//! Cogroup join operator (§4.F "join (cogroup / nested-loop / index)"),
//! ported from jogasaki's `executor::process::impl_::ops::cogroup`. Reads
//! two already-grouped [`GroupReader`]s (the output of the same key's
//! group exchange on each join input, §4.G) and merges them by key, the
//! same way a merge-sort join consumes two sorted runs.
//!
//! Index and nested-loop join (the operator contract's other two named
//! strategies) are left to the scan/storage-lookup path the compiled plan
//! already builds from `ScanOperator` plus a filter; only the cogroup shape
//! needs its own operator, since it is the only one that reads from a
//! second exchange source rather than from storage or from the variable
//! table already bound by an upstream operator.

use std::cmp::Ordering;

use sqlexec_exchange::GroupReader;
use sqlexec_record::{Decimal, FieldType, RecordMeta, RecordRef, VarlenValue};

use crate::context::OperatorContext;
use crate::expr::EvalValue;
use crate::operator::{Operator, OperatorKind, OperatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinKind {
    fn emits_unmatched_left(self) -> bool {
        matches!(self, JoinKind::LeftOuter | JoinKind::FullOuter)
    }

    fn emits_unmatched_right(self) -> bool {
        matches!(self, JoinKind::RightOuter | JoinKind::FullOuter)
    }
}

/// One joined-output column: which field of the side's group-reader record
/// it reads, and which variable it writes. The field's type comes from the
/// side's own [`RecordMeta`] at decode time, so unlike [`crate::operators::scan::ColumnBinding`]
/// there is no need to carry it here too.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub field_index: usize,
    pub variable_index: usize,
}

/// One joined row, decoded ahead of time so `process_row` only has to write
/// already-resolved values into the variable table (the same precompute-then-
/// replay shape [`crate::operators::aggregate::AggregateOperator`] uses for
/// its finalized groups). `None` on a side means "this side's columns are
/// unmatched" — an outer join's null-filled side.
struct JoinedRow {
    left: Option<Vec<EvalValue>>,
    right: Option<Vec<EvalValue>>,
}

pub struct CogroupJoinOperator {
    rows: Vec<JoinedRow>,
    position: usize,
    left_columns: Vec<ColumnBinding>,
    right_columns: Vec<ColumnBinding>,
    downstream: Option<Box<OperatorKind>>,
}

impl CogroupJoinOperator {
    /// `left_key_fields`/`right_key_fields` are paired by position: key
    /// component `i` of the left group compares against key component `i`
    /// of the right group. Both readers must already be grouped by those
    /// same key columns (the upstream group exchanges' job, not this
    /// operator's).
    pub fn new(
        left: GroupReader,
        right: GroupReader,
        kind: JoinKind,
        left_key_fields: Vec<usize>,
        right_key_fields: Vec<usize>,
        left_columns: Vec<ColumnBinding>,
        right_columns: Vec<ColumnBinding>,
        downstream: Option<Box<OperatorKind>>,
    ) -> Self {
        assert_eq!(left_key_fields.len(), right_key_fields.len(), "join key arity mismatch");
        let rows = build_rows(left, right, kind, &left_key_fields, &right_key_fields, &left_columns, &right_columns);
        Self { rows, position: 0, left_columns, right_columns, downstream }
    }
}

impl Operator for CogroupJoinOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        if self.position >= self.rows.len() {
            return OperatorResult::Eof;
        }
        let row = &self.rows[self.position];
        self.position += 1;

        let checkpoint = ctx.checkpoint_scratch();
        write_side(ctx, &self.left_columns, row.left.as_deref());
        write_side(ctx, &self.right_columns, row.right.as_deref());
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

/// Writes one side's decoded column values into the variable table, or nulls
/// out that side's variables entirely when it's `None` (the unmatched side
/// of an outer join). The plan is expected to have declared every
/// outer-joinable variable nullable, same as standard SQL LEFT/RIGHT JOIN
/// column nullability; [`crate::variable_table::VariableTable::set_null`]
/// panics otherwise.
fn write_side(ctx: &mut OperatorContext, columns: &[ColumnBinding], values: Option<&[EvalValue]>) {
    let (variables, scratch) = ctx.variables_and_scratch();
    let table = variables.current();
    match values {
        None => {
            for column in columns {
                table.set_null(column.variable_index);
            }
        }
        Some(values) => {
            for (column, value) in columns.iter().zip(values) {
                if matches!(value, EvalValue::Null) {
                    table.set_null(column.variable_index);
                } else {
                    table.set_dynamic(column.variable_index, value, scratch);
                }
            }
        }
    }
}

/// Merges two grouped, key-sorted readers, producing the full joined result
/// eagerly (mirroring `cogroup_operator`'s single-pass sweep, which is run
/// to completion at step activation rather than interleaved with output
/// consumption in the source's reader-context model too).
fn build_rows(
    mut left: GroupReader,
    mut right: GroupReader,
    kind: JoinKind,
    left_key_fields: &[usize],
    right_key_fields: &[usize],
    left_columns: &[ColumnBinding],
    right_columns: &[ColumnBinding],
) -> Vec<JoinedRow> {
    let mut rows = Vec::new();
    let mut has_left = left.next_group();
    let mut has_right = right.next_group();

    loop {
        match (has_left, has_right) {
            (false, false) => break,
            (true, false) => {
                if kind.emits_unmatched_left() {
                    emit_unmatched_left(&mut left, left_columns, &mut rows);
                }
                has_left = left.next_group();
            }
            (false, true) => {
                if kind.emits_unmatched_right() {
                    emit_unmatched_right(&mut right, right_columns, &mut rows);
                }
                has_right = right.next_group();
            }
            (true, true) => {
                // §4.F / §8 invariant: null keys never match. A null-keyed
                // group on either side is resolved on its own, independent
                // of where it would otherwise sort relative to the other
                // side, and never paired into an inner-join row.
                if group_key_is_null(&mut left, left_key_fields) {
                    if kind.emits_unmatched_left() {
                        emit_unmatched_left(&mut left, left_columns, &mut rows);
                    }
                    has_left = left.next_group();
                    continue;
                }
                if group_key_is_null(&mut right, right_key_fields) {
                    if kind.emits_unmatched_right() {
                        emit_unmatched_right(&mut right, right_columns, &mut rows);
                    }
                    has_right = right.next_group();
                    continue;
                }
                match compare_group_keys(&mut left, &mut right, left_key_fields, right_key_fields) {
                    Ordering::Less => {
                        if kind.emits_unmatched_left() {
                            emit_unmatched_left(&mut left, left_columns, &mut rows);
                        }
                        has_left = left.next_group();
                    }
                    Ordering::Greater => {
                        if kind.emits_unmatched_right() {
                            emit_unmatched_right(&mut right, right_columns, &mut rows);
                        }
                        has_right = right.next_group();
                    }
                    Ordering::Equal => {
                        emit_matched_group(&mut left, &mut right, left_columns, right_columns, &mut rows);
                        has_left = left.next_group();
                        has_right = right.next_group();
                    }
                }
            }
        }
    }
    rows
}

fn group_key_is_null(reader: &mut GroupReader, key_fields: &[usize]) -> bool {
    let meta = reader.meta().clone();
    let group = reader.get_group();
    key_fields.iter().any(|&field| meta.is_nullable(field) && group.is_null(meta.nullity_offset(field)))
}

fn compare_group_keys(left: &mut GroupReader, right: &mut GroupReader, left_key_fields: &[usize], right_key_fields: &[usize]) -> Ordering {
    let left_meta = left.meta().clone();
    let right_meta = right.meta().clone();
    let left_values: Vec<EvalValue> = {
        let (record, resolver) = left.get_group_with_resolver();
        left_key_fields.iter().map(|&field| decode_field(&record, &left_meta, field, resolver)).collect()
    };
    let right_values: Vec<EvalValue> = {
        let (record, resolver) = right.get_group_with_resolver();
        right_key_fields.iter().map(|&field| decode_field(&record, &right_meta, field, resolver)).collect()
    };
    for (a, b) in left_values.iter().zip(right_values.iter()) {
        let ordering = eval_cmp(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn emit_matched_group(left: &mut GroupReader, right: &mut GroupReader, left_columns: &[ColumnBinding], right_columns: &[ColumnBinding], rows: &mut Vec<JoinedRow>) {
    let left_meta = left.meta().clone();
    let right_meta = right.meta().clone();

    // Buffer the (typically small) right-hand member run once, then replay
    // it against every left member — a nested loop over one cogroup pair,
    // not over the whole input.
    let mut right_members = Vec::new();
    while right.next_member() {
        let (record, resolver) = right.get_member_with_resolver();
        right_members.push(decode_columns(&record, &right_meta, right_columns, resolver));
    }

    while left.next_member() {
        let left_values = {
            let (record, resolver) = left.get_member_with_resolver();
            decode_columns(&record, &left_meta, left_columns, resolver)
        };
        for right_values in &right_members {
            rows.push(JoinedRow { left: Some(left_values.clone()), right: Some(right_values.clone()) });
        }
    }
}

fn emit_unmatched_left(left: &mut GroupReader, left_columns: &[ColumnBinding], rows: &mut Vec<JoinedRow>) {
    let left_meta = left.meta().clone();
    while left.next_member() {
        let (record, resolver) = left.get_member_with_resolver();
        let left_values = decode_columns(&record, &left_meta, left_columns, resolver);
        rows.push(JoinedRow { left: Some(left_values), right: None });
    }
}

fn emit_unmatched_right(right: &mut GroupReader, right_columns: &[ColumnBinding], rows: &mut Vec<JoinedRow>) {
    let right_meta = right.meta().clone();
    while right.next_member() {
        let (record, resolver) = right.get_member_with_resolver();
        let right_values = decode_columns(&record, &right_meta, right_columns, resolver);
        rows.push(JoinedRow { left: None, right: Some(right_values) });
    }
}

fn decode_columns(record: &RecordRef<'_>, meta: &RecordMeta, columns: &[ColumnBinding], resolver: &dyn sqlexec_arena::ArenaResolve) -> Vec<EvalValue> {
    columns.iter().map(|column| decode_field(record, meta, column.field_index, resolver)).collect()
}

fn decode_field(record: &RecordRef<'_>, meta: &RecordMeta, field_index: usize, resolver: &dyn sqlexec_arena::ArenaResolve) -> EvalValue {
    if meta.is_nullable(field_index) && record.is_null(meta.nullity_offset(field_index)) {
        return EvalValue::Null;
    }
    let offset = meta.value_offset(field_index);
    match meta.field_type(field_index) {
        FieldType::Boolean => EvalValue::Boolean(record.get_value::<bool>(offset)),
        FieldType::Int1 => EvalValue::Int(record.get_value::<i8>(offset) as i64),
        FieldType::Int2 => EvalValue::Int(record.get_value::<i16>(offset) as i64),
        FieldType::Int4 => EvalValue::Int(record.get_value::<i32>(offset) as i64),
        FieldType::Int8 => EvalValue::Int(record.get_value::<i64>(offset)),
        FieldType::Float4 => EvalValue::Float(record.get_value::<f32>(offset) as f64),
        FieldType::Float8 => EvalValue::Float(record.get_value::<f64>(offset)),
        FieldType::Decimal { .. } => EvalValue::Decimal(record.get_value::<Decimal>(offset)),
        FieldType::Character { .. } | FieldType::Octet { .. } => {
            let varlen = record.get_value::<VarlenValue>(offset);
            EvalValue::Character(varlen.bytes(resolver).to_vec())
        }
        other => panic!("join cannot decode column of type {other:?}"),
    }
}

/// Ordering between two decoded key components. Mismatched variants only
/// arise from a miscompiled plan (key columns of incompatible type on the
/// two join sides) and compare equal rather than panicking, since this path
/// runs inside step activation rather than under `OperatorContext`'s normal
/// error-reporting protocol.
fn eval_cmp(a: &EvalValue, b: &EvalValue) -> Ordering {
    match (a, b) {
        (EvalValue::Boolean(x), EvalValue::Boolean(y)) => x.cmp(y),
        (EvalValue::Int(x), EvalValue::Int(y)) => x.cmp(y),
        (EvalValue::Float(x), EvalValue::Float(y)) => x.total_cmp(y),
        (EvalValue::Decimal(x), EvalValue::Decimal(y)) => sqlexec_record::comparator::compare_decimal(*x, *y),
        (EvalValue::Character(x), EvalValue::Character(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{FifoArena, LifoArena, PagePool};
    use sqlexec_exchange::{GroupExchange, GroupInputPartition};
    use sqlexec_record::FieldType;
    use std::sync::Arc;

    fn new_store(meta: RecordMeta) -> sqlexec_containers::IterableRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        sqlexec_containers::IterableRecordStore::new(meta, LifoArena::new(pool.clone()), LifoArena::new(pool))
    }

    fn push(partition: &mut GroupInputPartition, meta: &RecordMeta, key: i32, value: i64) {
        let mut buf = vec![0u8; meta.record_size()];
        let mut r = RecordRef::new(&mut buf);
        r.set_value::<i32>(meta.value_offset(0), key);
        r.set_value::<i64>(meta.value_offset(1), value);
        let empty_resolver = FifoArena::new(Arc::new(PagePool::new(64)));
        partition.push(&r, &empty_resolver);
    }

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false])
    }

    fn group_reader(entries: &[(i32, i64)]) -> GroupReader {
        let m = meta();
        let mut exchange = GroupExchange::new(m.clone(), 1, 1, || GroupInputPartition::new(new_store(meta()), 1));
        for &(k, v) in entries {
            push(exchange.partition_mut(0), &m, k, v);
        }
        exchange.into_reader()
    }

    fn columns() -> Vec<ColumnBinding> {
        vec![ColumnBinding { field_index: 0, variable_index: 0 }, ColumnBinding { field_index: 1, variable_index: 1 }]
    }

    #[test]
    fn inner_join_matches_equal_keys_only() {
        let left = group_reader(&[(1, 10), (2, 20)]);
        let right = group_reader(&[(1, 100), (3, 300)]);
        let rows = build_rows(left, right, JoinKind::Inner, &[0], &[0], &columns(), &columns());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].left.as_ref().unwrap()[1], EvalValue::Int(10));
        assert_eq!(rows[0].right.as_ref().unwrap()[1], EvalValue::Int(100));
    }

    #[test]
    fn left_outer_join_keeps_unmatched_left_rows_with_null_right() {
        let left = group_reader(&[(1, 10), (2, 20)]);
        let right = group_reader(&[(1, 100)]);
        let rows = build_rows(left, right, JoinKind::LeftOuter, &[0], &[0], &columns(), &columns());
        assert_eq!(rows.len(), 2);
        let unmatched = rows.iter().find(|r| r.right.is_none()).unwrap();
        assert_eq!(unmatched.left.as_ref().unwrap()[0], EvalValue::Int(2));
    }

    #[test]
    fn matched_group_cross_joins_members_within_one_key() {
        let left = group_reader(&[(1, 10), (1, 11)]);
        let right = group_reader(&[(1, 100), (1, 101)]);
        let rows = build_rows(left, right, JoinKind::Inner, &[0], &[0], &columns(), &columns());
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn null_key_never_matches_even_identical_null_on_both_sides() {
        let m = RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![true, false]);
        let mut left_exchange = GroupExchange::new(m.clone(), 1, 1, || GroupInputPartition::new(new_store(m.clone()), 1));
        {
            let p = left_exchange.partition_mut(0);
            let mut buf = vec![0u8; m.record_size()];
            let mut r = RecordRef::new(&mut buf);
            r.set_null(m.nullity_offset(0), true);
            r.set_value::<i64>(m.value_offset(1), 10);
            let resolver = FifoArena::new(Arc::new(PagePool::new(64)));
            p.push(&r, &resolver);
        }
        let left = left_exchange.into_reader();

        let mut right_exchange = GroupExchange::new(m.clone(), 1, 1, || GroupInputPartition::new(new_store(m.clone()), 1));
        {
            let p = right_exchange.partition_mut(0);
            let mut buf = vec![0u8; m.record_size()];
            let mut r = RecordRef::new(&mut buf);
            r.set_null(m.nullity_offset(0), true);
            r.set_value::<i64>(m.value_offset(1), 100);
            let resolver = FifoArena::new(Arc::new(PagePool::new(64)));
            p.push(&r, &resolver);
        }
        let right = right_exchange.into_reader();

        let rows = build_rows(left, right, JoinKind::Inner, &[0], &[0], &columns(), &columns());
        assert!(rows.is_empty());
    }
}
