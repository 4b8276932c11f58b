//! Single-producer/single-consumer FIFO record queue (§3/§4.C), ported from
//! jogasaki's `data::fifo_record_store`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use sqlexec_arena::{ArenaPtr, FifoArena, FifoCheckpoint};
use sqlexec_record::{CopyMode, RecordCopier, RecordMeta, RecordRef};

struct Entry {
    ptr: ArenaPtr,
    record_cp_after: FifoCheckpoint,
    varlen_cp_after: FifoCheckpoint,
}

/// FIFO queue of records. `push` deep-copies a record (including its varlen
/// payload) into the store's own arenas; `try_pop` yields records in
/// insertion order. A popped record stays valid until the *next* `try_pop`
/// call, at which point the previous record is deallocated, matching the
/// source's "accessible until the next pop" contract.
pub struct FifoRecordStore {
    meta: RecordMeta,
    record_arena: FifoArena,
    varlen_arena: FifoArena,
    queue: VecDeque<Entry>,
    count: AtomicUsize,
    pending_release: Option<Entry>,
}

impl FifoRecordStore {
    pub fn new(meta: RecordMeta, record_arena: FifoArena, varlen_arena: FifoArena) -> Self {
        Self {
            meta,
            record_arena,
            varlen_arena,
            queue: VecDeque::new(),
            count: AtomicUsize::new(0),
            pending_release: None,
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn push(&mut self, record: &RecordRef<'_>, varlen_resolver: &dyn sqlexec_arena::ArenaResolve) -> ArenaPtr {
        let size = self.meta.record_size();
        let ptr = self.record_arena.allocate(size, self.meta.alignment());
        {
            let mut dst = RecordRef::new(self.record_arena.resolve_mut(ptr, size));
            RecordCopier::new(&self.meta).copy(&mut dst, record, CopyMode::Deep, varlen_resolver, Some(&mut self.varlen_arena));
        }
        let record_cp_after = self.record_arena.checkpoint();
        let varlen_cp_after = self.varlen_arena.checkpoint();
        self.queue.push_back(Entry { ptr, record_cp_after, varlen_cp_after });
        self.count.fetch_add(1, Ordering::Relaxed);
        ptr
    }

    /// Pop the oldest record, if any. Releases the arena space used by the
    /// previously popped record (one pop behind) before returning the new
    /// head.
    pub fn try_pop(&mut self) -> Option<RecordRef<'_>> {
        if let Some(prev) = self.pending_release.take() {
            self.record_arena.deallocate_before(prev.record_cp_after);
            self.varlen_arena.deallocate_before(prev.varlen_cp_after);
        }
        let entry = self.queue.pop_front()?;
        self.count.fetch_sub(1, Ordering::Relaxed);
        let size = self.meta.record_size();
        let ptr = entry.ptr;
        self.pending_release = Some(entry);
        Some(RecordRef::new(self.record_arena.resolve_mut(ptr, size)))
    }

    pub fn varlen_resolver(&self) -> &dyn sqlexec_arena::ArenaResolve {
        &self.varlen_arena
    }

    /// Eventually-consistent count (§3): monotone between producer
    /// observations and pops, exact here since store access is exclusive.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn empty(&self) -> bool {
        self.count() == 0
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.pending_release = None;
        self.record_arena.reset();
        self.varlen_arena.reset();
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::PagePool;
    use sqlexec_record::FieldType;
    use std::sync::Arc;

    fn store() -> FifoRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        FifoRecordStore::new(meta, FifoArena::new(pool.clone()), FifoArena::new(pool))
    }

    fn empty_resolver() -> FifoArena {
        FifoArena::new(Arc::new(PagePool::new(64)))
    }

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let mut s = store();
        let mut buf = vec![0u8; s.meta().record_size()];
        let resolver = empty_resolver();
        for v in [10, 20, 30] {
            let mut r = RecordRef::new(&mut buf);
            r.set_value::<i32>(0, v);
            let src = RecordRef::new(&mut buf);
            s.push(&src, &resolver);
        }
        assert_eq!(s.count(), 3);
        let mut out = Vec::new();
        while let Some(r) = s.try_pop() {
            out.push(r.get_value::<i32>(0));
        }
        assert_eq!(out, vec![10, 20, 30]);
        assert!(s.empty());
    }

    #[test]
    fn popped_record_stays_valid_until_next_pop() {
        let mut s = store();
        let mut buf = vec![0u8; s.meta().record_size()];
        let resolver = empty_resolver();
        for v in [1, 2] {
            let mut r = RecordRef::new(&mut buf);
            r.set_value::<i32>(0, v);
            let src = RecordRef::new(&mut buf);
            s.push(&src, &resolver);
        }
        let first = s.try_pop().unwrap().get_value::<i32>(0);
        assert_eq!(first, 1);
        // first record's storage is only released on the *next* pop.
        let second = s.try_pop().unwrap().get_value::<i32>(0);
        assert_eq!(second, 2);
    }
}
