//! Incremental aggregate exchange (§4.G), ported from jogasaki's
//! `executor::exchange::aggregate` plus `executor::function::aggregator_info`
//! (a thin wrapper pairing an aggregator kind with its input/output value
//! shape). Input rows are combined into a per-group partial accumulator as
//! they arrive (pre-shuffle, local combine), then every partition's partials
//! sharing a group key are merged post-shuffle and finalized.
//!
//! `AVG` is decomposed into a running `(sum, count)` pair during the partial
//! phase and divided only once, in `finalize`, so partial merges stay
//! associative regardless of how many times partials are combined along the
//! way.

use std::collections::HashMap;

use sqlexec_record::key::{self, NullsOrder, SortOrder};
use sqlexec_record::{FieldType, RecordMeta, RecordRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorKind {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

/// Running partial state for one aggregated column. `Avg` carries its own
/// running count rather than sharing the group's row count, since NULL
/// inputs are excluded from the count for that column specifically.
#[derive(Debug, Clone, Copy)]
pub enum Partial {
    Sum(f64),
    Count(i64),
    Avg { sum: f64, count: i64 },
    Min(f64),
    Max(f64),
    /// No non-null input has been combined into this column yet.
    Empty(AggregatorKind),
}

impl Partial {
    fn empty(kind: AggregatorKind) -> Self {
        Partial::Empty(kind)
    }

    fn combine_value(self, input: f64) -> Self {
        match self {
            Partial::Empty(AggregatorKind::Sum) => Partial::Sum(input),
            Partial::Empty(AggregatorKind::Count) => Partial::Count(1),
            Partial::Empty(AggregatorKind::Avg) => Partial::Avg { sum: input, count: 1 },
            Partial::Empty(AggregatorKind::Min) => Partial::Min(input),
            Partial::Empty(AggregatorKind::Max) => Partial::Max(input),
            Partial::Sum(acc) => Partial::Sum(acc + input),
            Partial::Count(acc) => Partial::Count(acc + 1),
            Partial::Avg { sum, count } => Partial::Avg { sum: sum + input, count: count + 1 },
            Partial::Min(acc) => Partial::Min(acc.min(input)),
            Partial::Max(acc) => Partial::Max(acc.max(input)),
        }
    }

    /// `COUNT` ignores the input value entirely (only nullity matters), so
    /// it has its own combine path that never looks at the value column.
    fn combine_row_seen(self) -> Self {
        match self {
            Partial::Empty(AggregatorKind::Count) => Partial::Count(1),
            Partial::Count(acc) => Partial::Count(acc + 1),
            other => other,
        }
    }

    fn merge(self, other: Partial) -> Partial {
        match (self, other) {
            (Partial::Empty(_), b) => b,
            (a, Partial::Empty(_)) => a,
            (Partial::Sum(a), Partial::Sum(b)) => Partial::Sum(a + b),
            (Partial::Count(a), Partial::Count(b)) => Partial::Count(a + b),
            (Partial::Avg { sum: sa, count: ca }, Partial::Avg { sum: sb, count: cb }) => {
                Partial::Avg { sum: sa + sb, count: ca + cb }
            }
            (Partial::Min(a), Partial::Min(b)) => Partial::Min(a.min(b)),
            (Partial::Max(a), Partial::Max(b)) => Partial::Max(a.max(b)),
            (a, _) => a,
        }
    }

    /// `None` means the finalized value is SQL NULL (no non-null input ever
    /// seen for this column in this group), matching standard aggregate
    /// semantics for an empty group.
    fn finalize(self) -> Option<f64> {
        match self {
            Partial::Empty(_) => None,
            Partial::Sum(v) | Partial::Min(v) | Partial::Max(v) => Some(v),
            Partial::Count(v) => Some(v as f64),
            Partial::Avg { sum, count } => if count == 0 { None } else { Some(sum / count as f64) },
        }
    }
}

/// Column-level aggregation descriptor: which source field feeds it and
/// which combiner applies.
#[derive(Debug, Clone, Copy)]
pub struct AggregateColumn {
    pub source_field: usize,
    pub kind: AggregatorKind,
}

fn encode_group_key(meta: &RecordMeta, key_field_count: usize, record: &RecordRef<'_>) -> Vec<u8> {
    let mut out = Vec::new();
    for field in 0..key_field_count {
        let is_null = meta.is_nullable(field) && record.is_null(meta.nullity_offset(field));
        key::encode_null_prefix(&mut out, is_null, NullsOrder::First);
        if is_null {
            continue;
        }
        let offset = meta.value_offset(field);
        match meta.field_type(field) {
            FieldType::Int4 => key::encode_i32(&mut out, record.get_value::<i32>(offset), SortOrder::Ascending),
            FieldType::Int8 => key::encode_i64(&mut out, record.get_value::<i64>(offset), SortOrder::Ascending),
            FieldType::Character { .. } | FieldType::Octet { .. } => {
                let bytes = &record.as_bytes()[offset..offset + sqlexec_record::value::VARLEN_VALUE_SIZE];
                key::encode_bytes(&mut out, bytes, SortOrder::Ascending);
            }
            other => out.extend_from_slice(&record.as_bytes()[offset..offset + other.size()]),
        }
    }
    out
}

fn extract_f64(meta: &RecordMeta, field: usize, record: &RecordRef<'_>) -> Option<f64> {
    if meta.is_nullable(field) && record.is_null(meta.nullity_offset(field)) {
        return None;
    }
    let offset = meta.value_offset(field);
    Some(match meta.field_type(field) {
        FieldType::Int1 => record.get_value::<i8>(offset) as f64,
        FieldType::Int2 => record.get_value::<i16>(offset) as f64,
        FieldType::Int4 => record.get_value::<i32>(offset) as f64,
        FieldType::Int8 => record.get_value::<i64>(offset) as f64,
        FieldType::Float4 => record.get_value::<f32>(offset) as f64,
        FieldType::Float8 => record.get_value::<f64>(offset),
        other => panic!("aggregate column has non-numeric field type {other:?}"),
    })
}

/// Per-partition accumulator table, keyed by the group's encoded key bytes.
/// Combines rows locally as they arrive, before any shuffle — the
/// "incremental" half of the incremental aggregate exchange.
pub struct AggregateInputPartition {
    input_meta: RecordMeta,
    key_field_count: usize,
    columns: Vec<AggregateColumn>,
    groups: HashMap<Vec<u8>, (Vec<u8>, Vec<Partial>)>,
}

impl AggregateInputPartition {
    pub fn new(input_meta: RecordMeta, key_field_count: usize, columns: Vec<AggregateColumn>) -> Self {
        Self { input_meta, key_field_count, columns, groups: HashMap::new() }
    }

    pub fn combine(&mut self, record: &RecordRef<'_>) {
        let key_bytes = encode_group_key(&self.input_meta, self.key_field_count, record);
        let entry = self.groups.entry(key_bytes.clone()).or_insert_with(|| {
            let partials = self.columns.iter().map(|c| Partial::empty(c.kind)).collect();
            (key_bytes, partials)
        });
        for (slot, column) in entry.1.iter_mut().zip(self.columns.iter()) {
            if column.kind == AggregatorKind::Count {
                *slot = slot.combine_row_seen();
                continue;
            }
            if let Some(v) = extract_f64(&self.input_meta, column.source_field, record) {
                *slot = slot.combine_value(v);
            }
        }
    }

    pub fn into_partials(self) -> Vec<(Vec<u8>, Vec<Partial>)> {
        self.groups.into_values().collect()
    }
}

/// Post-shuffle merge: combines every input partition's partials sharing a
/// group key, then finalizes each column (dividing `AVG`'s running sum by
/// its running count exactly once).
pub struct AggregateExchange {
    columns: Vec<AggregateColumn>,
    merged: HashMap<Vec<u8>, Vec<Partial>>,
}

impl AggregateExchange {
    pub fn new(columns: Vec<AggregateColumn>) -> Self {
        Self { columns, merged: HashMap::new() }
    }

    pub fn merge_partition(&mut self, partials: Vec<(Vec<u8>, Vec<Partial>)>) {
        for (key, incoming) in partials {
            let entry = self.merged.entry(key).or_insert_with(|| self.columns.iter().map(|c| Partial::empty(c.kind)).collect());
            for (slot, incoming) in entry.iter_mut().zip(incoming) {
                *slot = slot.merge(incoming);
            }
        }
    }

    /// Finalized `(group_key_bytes, per_column_value)` pairs; `None` in a
    /// column means that aggregate is SQL NULL for this group.
    pub fn finalize(self) -> Vec<(Vec<u8>, Vec<Option<f64>>)> {
        self.merged
            .into_iter()
            .map(|(key, partials)| (key, partials.into_iter().map(Partial::finalize).collect()))
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.merged.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false])
    }

    fn row(m: &RecordMeta, key: i32, value: i64) -> Vec<u8> {
        let mut buf = vec![0u8; m.record_size()];
        {
            let mut r = RecordRef::new(&mut buf);
            r.set_value::<i32>(m.value_offset(0), key);
            r.set_value::<i64>(m.value_offset(1), value);
        }
        buf
    }

    #[test]
    fn sum_and_avg_combine_across_partitions() {
        let m = meta();
        let columns = vec![
            AggregateColumn { source_field: 1, kind: AggregatorKind::Sum },
            AggregateColumn { source_field: 1, kind: AggregatorKind::Avg },
            AggregateColumn { source_field: 1, kind: AggregatorKind::Count },
        ];

        let mut p0 = AggregateInputPartition::new(m.clone(), 1, columns.clone());
        let mut b1 = row(&m, 1, 10);
        p0.combine(&RecordRef::new(&mut b1));
        let mut b2 = row(&m, 1, 20);
        p0.combine(&RecordRef::new(&mut b2));

        let mut p1 = AggregateInputPartition::new(m.clone(), 1, columns.clone());
        let mut b3 = row(&m, 1, 30);
        p1.combine(&RecordRef::new(&mut b3));

        let mut exchange = AggregateExchange::new(columns);
        exchange.merge_partition(p0.into_partials());
        exchange.merge_partition(p1.into_partials());

        let finalized = exchange.finalize();
        assert_eq!(finalized.len(), 1);
        let (_, values) = &finalized[0];
        assert_eq!(values[0], Some(60.0)); // sum
        assert_eq!(values[1], Some(20.0)); // avg = 60/3
        assert_eq!(values[2], Some(3.0)); // count
    }

    #[test]
    fn distinct_keys_stay_separate_groups() {
        let m = meta();
        let columns = vec![AggregateColumn { source_field: 1, kind: AggregatorKind::Sum }];
        let mut p0 = AggregateInputPartition::new(m.clone(), 1, columns.clone());
        let mut b1 = row(&m, 1, 5);
        p0.combine(&RecordRef::new(&mut b1));
        let mut b2 = row(&m, 2, 7);
        p0.combine(&RecordRef::new(&mut b2));

        let mut exchange = AggregateExchange::new(columns);
        exchange.merge_partition(p0.into_partials());
        assert_eq!(exchange.group_count(), 2);
    }
}
