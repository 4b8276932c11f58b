//! Group exchange (§4.G): partitions records by key, then presents a
//! group/member reader state machine. Ported from jogasaki's
//! `executor::exchange::group::sorted_vector_reader`: rather than a k-way
//! merge over a priority queue, every input partition's pointers are
//! gathered into one vector and sorted once, then walked linearly.
//!
//! Sorting compares a precomputed order-preserving byte key per record (via
//! [`sqlexec_record::key`]) instead of decoding and comparing field values on
//! every pairwise sort step; this also sidesteps having to hold two `&mut`
//! views into the same backing store open at once during a comparator call.

use sqlexec_arena::ArenaPtr;
use sqlexec_containers::IterableRecordStore;
use sqlexec_record::key::{self, NullsOrder, SortOrder};
use sqlexec_record::{FieldType, RecordMeta, RecordRef};

fn encode_key_prefix(meta: &RecordMeta, key_field_count: usize, record: &RecordRef<'_>) -> Vec<u8> {
    let mut out = Vec::new();
    for field in 0..key_field_count {
        let is_null = meta.is_nullable(field) && record.is_null(meta.nullity_offset(field));
        key::encode_null_prefix(&mut out, is_null, NullsOrder::First);
        if is_null {
            continue;
        }
        let offset = meta.value_offset(field);
        match meta.field_type(field) {
            FieldType::Boolean => key::encode_bool(&mut out, record.get_value::<bool>(offset), SortOrder::Ascending),
            FieldType::Int1 => key::encode_i8(&mut out, record.get_value::<i8>(offset), SortOrder::Ascending),
            FieldType::Int2 => key::encode_i16(&mut out, record.get_value::<i16>(offset), SortOrder::Ascending),
            FieldType::Int4 => key::encode_i32(&mut out, record.get_value::<i32>(offset), SortOrder::Ascending),
            FieldType::Int8 => key::encode_i64(&mut out, record.get_value::<i64>(offset), SortOrder::Ascending),
            FieldType::Float4 => key::encode_f32(&mut out, record.get_value::<f32>(offset), SortOrder::Ascending),
            FieldType::Float8 => key::encode_f64(&mut out, record.get_value::<f64>(offset), SortOrder::Ascending),
            FieldType::Date => key::encode_i32(&mut out, record.get_value::<sqlexec_record::Date>(offset).0, SortOrder::Ascending),
            FieldType::Character { .. } | FieldType::Octet { .. } => {
                // Group keys are expected to fit inline; only the inline
                // prefix bytes participate in ordering (see comparator.rs).
                let bytes = &record.as_bytes()[offset..offset + sqlexec_record::value::VARLEN_VALUE_SIZE];
                key::encode_bytes(&mut out, bytes, SortOrder::Ascending);
            }
            other => {
                // Every other field type used as a group key still needs a
                // stable total order; fall back to raw-byte comparison of
                // its fixed-width slot (not order-preserving across
                // representations, but stable and sufficient to detect
                // group boundaries, which is the only thing a key prefix is
                // used for here).
                let width = other.size();
                out.extend_from_slice(&record.as_bytes()[offset..offset + width]);
            }
        }
    }
    out
}

/// Shuffle-side: buffers incoming records for one destination partition.
pub struct GroupInputPartition {
    store: IterableRecordStore,
    key_field_count: usize,
    entries: Vec<(Vec<u8>, ArenaPtr)>,
}

impl GroupInputPartition {
    pub fn new(store: IterableRecordStore, key_field_count: usize) -> Self {
        Self { store, key_field_count, entries: Vec::new() }
    }

    pub fn push(&mut self, record: &RecordRef<'_>, varlen_resolver: &dyn sqlexec_arena::ArenaResolve) {
        let ptr = self.store.append(record, varlen_resolver);
        let key_bytes = {
            let stored = self.store.get(ptr);
            encode_key_prefix(self.store.meta(), self.key_field_count, &stored)
        };
        self.entries.push((key_bytes, ptr));
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }
}

pub struct GroupExchange {
    meta: RecordMeta,
    key_field_count: usize,
    partitions: Vec<GroupInputPartition>,
}

impl GroupExchange {
    pub fn new(meta: RecordMeta, key_field_count: usize, partition_count: usize, make_partition: impl Fn() -> GroupInputPartition) -> Self {
        assert!(key_field_count <= meta.field_count());
        let partitions = (0..partition_count).map(|_| make_partition()).collect();
        Self { meta, key_field_count, partitions }
    }

    /// Assembles an exchange directly from already-populated input
    /// partitions (one per upstream task), rather than building them
    /// in-place via `new`'s factory. Used by [`crate::registry::ExchangeRegistry`]
    /// to flush the partitions upstream `offer` operators deposited once
    /// every one of them has finished.
    pub fn from_partitions(meta: RecordMeta, key_field_count: usize, partitions: Vec<GroupInputPartition>) -> Self {
        assert!(key_field_count <= meta.field_count());
        Self { meta, key_field_count, partitions }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn partition_mut(&mut self, index: usize) -> &mut GroupInputPartition {
        &mut self.partitions[index]
    }

    /// Gathers every partition's pointers into one vector, stable-sorts it
    /// by key bytes (stable so member order within a group follows arrival
    /// order, matching most shuffle readers downstream expect), and hands
    /// ownership of the backing stores to the returned reader.
    pub fn into_reader(self) -> GroupReader {
        let mut order: Vec<(Vec<u8>, usize, ArenaPtr)> = Vec::new();
        let mut stores = Vec::with_capacity(self.partitions.len());
        for (partition_index, partition) in self.partitions.into_iter().enumerate() {
            for (key_bytes, ptr) in partition.entries {
                order.push((key_bytes, partition_index, ptr));
            }
            stores.push(partition.store);
        }
        order.sort_by(|a, b| a.0.cmp(&b.0));

        GroupReader {
            meta: self.meta,
            stores,
            order,
            position: 0,
            group_start: 0,
            state: ReaderState::Init,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Init,
    BeforeMember,
    OnMember,
    AfterGroup,
    Eof,
}

/// Group/member reader over the result of [`GroupExchange::into_reader`].
/// State machine mirrors `sorted_vector_reader`: `next_group` advances past
/// the previous group (if any) to the next distinct key; `next_member`
/// advances within the current group's member run.
pub struct GroupReader {
    meta: RecordMeta,
    stores: Vec<IterableRecordStore>,
    order: Vec<(Vec<u8>, usize, ArenaPtr)>,
    position: usize,
    group_start: usize,
    state: ReaderState,
}

impl GroupReader {
    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn record_at(&mut self, index: usize) -> RecordRef<'_> {
        let (_, partition, ptr) = &self.order[index];
        self.stores[*partition].get(*ptr)
    }

    fn same_group(&self, a: usize, b: usize) -> bool {
        self.order[a].0 == self.order[b].0
    }

    /// Advance to the next group. Returns `false` at end of input.
    pub fn next_group(&mut self) -> bool {
        match self.state {
            ReaderState::Eof => false,
            ReaderState::Init => {
                if self.order.is_empty() {
                    self.state = ReaderState::Eof;
                    return false;
                }
                self.group_start = 0;
                self.position = 0;
                self.state = ReaderState::BeforeMember;
                true
            }
            ReaderState::BeforeMember | ReaderState::OnMember | ReaderState::AfterGroup => {
                let mut next = self.group_start;
                while next < self.order.len() && self.same_group(self.group_start, next) {
                    next += 1;
                }
                if next >= self.order.len() {
                    self.state = ReaderState::Eof;
                    return false;
                }
                self.group_start = next;
                self.position = next;
                self.state = ReaderState::BeforeMember;
                true
            }
        }
    }

    /// The group's key record (its first member; the key columns occupy a
    /// shared leading prefix of every member's fields).
    pub fn get_group(&mut self) -> RecordRef<'_> {
        assert!(matches!(self.state, ReaderState::BeforeMember | ReaderState::OnMember | ReaderState::AfterGroup));
        self.record_at(self.group_start)
    }

    /// Advance to the next member of the current group. Returns `false` once
    /// the group is exhausted (state becomes `AfterGroup` — more groups may
    /// still follow, so this is not `Eof`).
    pub fn next_member(&mut self) -> bool {
        match self.state {
            ReaderState::BeforeMember => {
                self.position = self.group_start;
                self.state = ReaderState::OnMember;
                true
            }
            ReaderState::OnMember => {
                let next = self.position + 1;
                if next < self.order.len() && self.same_group(self.group_start, next) {
                    self.position = next;
                    true
                } else {
                    self.state = ReaderState::AfterGroup;
                    false
                }
            }
            ReaderState::AfterGroup | ReaderState::Eof | ReaderState::Init => false,
        }
    }

    pub fn get_member(&mut self) -> RecordRef<'_> {
        assert_eq!(self.state, ReaderState::OnMember);
        self.record_at(self.position)
    }

    fn record_with_resolver_at(&mut self, index: usize) -> (RecordRef<'_>, &dyn sqlexec_arena::ArenaResolve) {
        let (_, partition, ptr) = &self.order[index];
        self.stores[*partition].get_with_resolver(*ptr)
    }

    /// Like [`GroupReader::get_group`], but also returns the varlen resolver
    /// for the partition that group's key row lives in — needed by a cogroup
    /// join reading an out-of-line CHARACTER/OCTET key column.
    pub fn get_group_with_resolver(&mut self) -> (RecordRef<'_>, &dyn sqlexec_arena::ArenaResolve) {
        assert!(matches!(self.state, ReaderState::BeforeMember | ReaderState::OnMember | ReaderState::AfterGroup));
        self.record_with_resolver_at(self.group_start)
    }

    /// Like [`GroupReader::get_member`], with the member's varlen resolver.
    pub fn get_member_with_resolver(&mut self) -> (RecordRef<'_>, &dyn sqlexec_arena::ArenaResolve) {
        assert_eq!(self.state, ReaderState::OnMember);
        self.record_with_resolver_at(self.position)
    }

    /// Release the reader's position tracking. Mirrors `group_reader::release`
    /// — the backing stores themselves drop with the reader, not reset
    /// independently.
    pub fn release(&mut self) {
        self.position = 0;
        self.group_start = 0;
        self.state = ReaderState::Eof;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{FifoArena, LifoArena, PagePool};
    use std::sync::Arc;

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false])
    }

    fn new_store(meta: RecordMeta) -> IterableRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        IterableRecordStore::new(meta, LifoArena::new(pool.clone()), LifoArena::new(pool))
    }

    fn push(partition: &mut GroupInputPartition, meta: &RecordMeta, key: i32, value: i64) {
        let mut buf = vec![0u8; meta.record_size()];
        let mut r = RecordRef::new(&mut buf);
        r.set_value::<i32>(meta.value_offset(0), key);
        r.set_value::<i64>(meta.value_offset(1), value);
        let empty_resolver = FifoArena::new(Arc::new(PagePool::new(64)));
        partition.push(&r, &empty_resolver);
    }

    #[test]
    fn groups_members_by_leading_key_field() {
        let m = meta();
        let mut exchange = GroupExchange::new(m.clone(), 1, 1, || GroupInputPartition::new(new_store(meta()), 1));
        {
            let p = exchange.partition_mut(0);
            push(p, &m, 2, 20);
            push(p, &m, 1, 10);
            push(p, &m, 1, 11);
            push(p, &m, 3, 30);
        }
        let mut reader = exchange.into_reader();

        let mut groups = Vec::new();
        while reader.next_group() {
            let key = reader.get_group().get_value::<i32>(m.value_offset(0));
            let mut members = Vec::new();
            while reader.next_member() {
                members.push(reader.get_member().get_value::<i64>(m.value_offset(1)));
            }
            groups.push((key, members));
        }

        assert_eq!(groups, vec![(1, vec![10, 11]), (2, vec![20]), (3, vec![30])]);
    }

    #[test]
    fn empty_exchange_has_no_groups() {
        let m = meta();
        let exchange = GroupExchange::new(m, 1, 1, || GroupInputPartition::new(new_store(meta()), 1));
        let mut reader = exchange.into_reader();
        assert!(!reader.next_group());
    }

    #[test]
    fn groups_span_multiple_input_partitions() {
        let m = meta();
        let mut exchange = GroupExchange::new(m.clone(), 1, 2, || GroupInputPartition::new(new_store(meta()), 1));
        push(exchange.partition_mut(0), &m, 5, 1);
        push(exchange.partition_mut(1), &m, 5, 2);
        push(exchange.partition_mut(0), &m, 1, 3);

        let mut reader = exchange.into_reader();
        assert!(reader.next_group());
        assert_eq!(reader.get_group().get_value::<i32>(m.value_offset(0)), 1);
        assert!(reader.next_member());
        assert!(!reader.next_member());

        assert!(reader.next_group());
        assert_eq!(reader.get_group().get_value::<i32>(m.value_offset(0)), 5);
        let mut values = Vec::new();
        while reader.next_member() {
            values.push(reader.get_member().get_value::<i64>(m.value_offset(1)));
        }
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);

        assert!(!reader.next_group());
    }
}
