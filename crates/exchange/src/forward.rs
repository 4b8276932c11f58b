//! Forward exchange (§4.G): a pass-through shuffle that routes every input
//! partition to the single corresponding output partition, with no sort or
//! combine. Ported from jogasaki's `executor::exchange::forward` (`flow.h`,
//! `sink.h`, `writer.h`): a forward step runs a single nop task per
//! activation and wraps each input partition's store behind a `sink`/
//! `writer` pair so downstream readers see the same shape as any other
//! exchange.

use sqlexec_arena::ArenaResolve;
use sqlexec_containers::IterableRecordStore;
use sqlexec_record::RecordMeta;

/// Accepts rows for one partition, appending them into that partition's
/// backing store. One writer is acquired per upstream task producing into
/// this partition (the forward exchange imposes no ordering constraint:
/// every writer appends independently, mirroring `forward::writer::write`
/// being a thin pass-through with no merge logic of its own).
pub struct ForwardWriter<'s> {
    store: &'s mut IterableRecordStore,
}

impl<'s> ForwardWriter<'s> {
    pub fn new(store: &'s mut IterableRecordStore) -> Self {
        Self { store }
    }

    pub fn write(&mut self, record: &sqlexec_record::RecordRef<'_>, varlen_resolver: &dyn ArenaResolve) {
        self.store.append(record, varlen_resolver);
    }
}

/// One partition's worth of forwarded records, readable once all upstream
/// writers have finished (the forward exchange's single nop task completes
/// as soon as it is scheduled, since there is nothing to compute).
pub struct ForwardPartition {
    store: IterableRecordStore,
}

impl ForwardPartition {
    pub fn new(store: IterableRecordStore) -> Self {
        Self { store }
    }

    pub fn writer(&mut self) -> ForwardWriter<'_> {
        ForwardWriter::new(&mut self.store)
    }

    pub fn store(&self) -> &IterableRecordStore {
        &self.store
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Consumes the partition, handing its backing store to a reader (e.g.
    /// [`crate`]-external `take`) that pulls records back out one at a time.
    pub fn into_store(self) -> IterableRecordStore {
        self.store
    }
}

/// Fixed-width exchange, one partition in and one partition out per index —
/// the degenerate case of a shuffle where partition assignment is the
/// identity function.
pub struct ForwardExchange {
    meta: RecordMeta,
    partitions: Vec<ForwardPartition>,
}

impl ForwardExchange {
    pub fn new(meta: RecordMeta, partition_count: usize, make_store: impl Fn() -> IterableRecordStore) -> Self {
        let partitions = (0..partition_count).map(|_| ForwardPartition::new(make_store())).collect();
        Self { meta, partitions }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_mut(&mut self, index: usize) -> &mut ForwardPartition {
        &mut self.partitions[index]
    }

    pub fn partition(&self, index: usize) -> &ForwardPartition {
        &self.partitions[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{FifoArena, LifoArena, PagePool};
    use sqlexec_containers::IterableRecordStore;
    use sqlexec_record::{FieldType, RecordRef};
    use std::sync::Arc;

    fn store(meta: RecordMeta) -> IterableRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        IterableRecordStore::new(meta, LifoArena::new(pool.clone()), LifoArena::new(pool))
    }

    #[test]
    fn writer_appends_into_its_own_partition_only() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        let meta_for_store = meta.clone();
        let mut exchange = ForwardExchange::new(meta.clone(), 2, move || store(meta_for_store.clone()));

        let mut buf = vec![0u8; meta.record_size()];
        let mut rec = RecordRef::new(&mut buf);
        rec.set_value::<i32>(meta.value_offset(0), 7);

        let empty_resolver = FifoArena::new(Arc::new(PagePool::new(64)));
        {
            let partition = exchange.partition_mut(0);
            let mut writer = partition.writer();
            writer.write(&rec, &empty_resolver);
        }

        assert_eq!(exchange.partition(0).count(), 1);
        assert_eq!(exchange.partition(1).count(), 0);
    }
}
