//! Result store (§4.C): an ordered collection of per-partition iterable
//! stores with a flattening iterator that concatenates partitions in index
//! order, skipping empty ones.

use sqlexec_arena::ArenaPtr;

use crate::iterable::IterableRecordStore;

#[derive(Default)]
pub struct ResultStore {
    partitions: Vec<IterableRecordStore>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self { partitions: Vec::new() }
    }

    pub fn push_partition(&mut self, partition: IterableRecordStore) {
        self.partitions.push(partition);
    }

    pub fn partition(&self, index: usize) -> &IterableRecordStore {
        &self.partitions[index]
    }

    pub fn partition_mut(&mut self, index: usize) -> &mut IterableRecordStore {
        &mut self.partitions[index]
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn total_count(&self) -> usize {
        self.partitions.iter().map(|p| p.count()).sum()
    }

    /// Concatenate partitions in index order, skipping empty partitions,
    /// yielding `(partition_index, pointer)` pairs.
    pub fn flatten(&self) -> impl Iterator<Item = (usize, ArenaPtr)> + '_ {
        self.partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.empty())
            .flat_map(|(i, p)| p.iter().map(move |ptr| (i, ptr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{FifoArena, LifoArena, PagePool};
    use sqlexec_record::{FieldType, RecordMeta, RecordRef};
    use std::sync::Arc;

    #[test]
    fn flatten_skips_empty_partitions_and_preserves_order() {
        let pool = Arc::new(PagePool::new(4096));
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        let mut result = ResultStore::new();
        let empty_resolver = FifoArena::new(Arc::new(PagePool::new(64)));

        let mut p0 = IterableRecordStore::new(meta.clone(), LifoArena::new(pool.clone()), LifoArena::new(pool.clone()));
        let mut buf = vec![0u8; meta.record_size()];
        {
            let mut r = RecordRef::new(&mut buf);
            r.set_value::<i32>(0, 1);
        }
        p0.append(&RecordRef::new(&mut buf), &empty_resolver);
        result.push_partition(p0);

        result.push_partition(IterableRecordStore::new(meta.clone(), LifoArena::new(pool.clone()), LifoArena::new(pool.clone())));

        let mut p2 = IterableRecordStore::new(meta.clone(), LifoArena::new(pool.clone()), LifoArena::new(pool));
        {
            let mut r = RecordRef::new(&mut buf);
            r.set_value::<i32>(0, 2);
        }
        p2.append(&RecordRef::new(&mut buf), &empty_resolver);
        result.push_partition(p2);

        let indices: Vec<usize> = result.flatten().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
