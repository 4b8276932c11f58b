//! Append-only iterable record store (§3/§4.C), ported from jogasaki's
//! `data::iteratable_record_store`. Per the REDESIGN FLAGS this workspace
//! follows, records are addressed by `(page, offset)` [`ArenaPtr`] handles
//! rather than raw pointers, so the store (and its iterator) stay relocatable
//! and don't need to chase page boundaries by hand — resolving a handle
//! through the backing arena does that for us.

use sqlexec_arena::{ArenaPtr, LifoArena};
use sqlexec_record::{CopyMode, RecordCopier, RecordMeta, RecordRef};

/// Append-only store: records live in arena pages and are never moved.
/// `reset` releases all pages and clears the append order.
pub struct IterableRecordStore {
    meta: RecordMeta,
    arena: LifoArena,
    varlen_arena: LifoArena,
    order: Vec<ArenaPtr>,
}

impl IterableRecordStore {
    pub fn new(meta: RecordMeta, arena: LifoArena, varlen_arena: LifoArena) -> Self {
        Self { meta, arena, varlen_arena, order: Vec::new() }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    /// Append a deep copy of `record`, returning a handle to the stored
    /// position. Caller's `record` may reference a different (shorter-lived)
    /// arena; the store always copies varlen payloads into its own arena.
    pub fn append(&mut self, record: &RecordRef<'_>, varlen_resolver: &dyn sqlexec_arena::ArenaResolve) -> ArenaPtr {
        let size = self.meta.record_size();
        let ptr = self.arena.allocate(size, self.meta.alignment());
        {
            let mut dst = RecordRef::new(self.arena.resolve_mut(ptr, size));
            RecordCopier::new(&self.meta).copy(&mut dst, record, CopyMode::Deep, varlen_resolver, Some(&mut self.varlen_arena));
        }
        self.order.push(ptr);
        ptr
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fetch a mutable reference to a previously appended record. `RecordRef`
    /// never owns memory either way, so this doubles as the read path —
    /// callers that only want to read simply don't call any setter.
    pub fn get(&mut self, ptr: ArenaPtr) -> RecordRef<'_> {
        let size = self.meta.record_size();
        RecordRef::new(self.arena.resolve_mut(ptr, size))
    }

    pub fn varlen_resolver(&self) -> &dyn sqlexec_arena::ArenaResolve {
        &self.varlen_arena
    }

    /// `get` and `varlen_resolver` in one call: two disjoint fields of
    /// `self` borrowed at once (record bytes mutably, the varlen arena
    /// immutably), so callers that need to decode a varlen field out of a
    /// stored record don't have to choose between them.
    pub fn get_with_resolver(&mut self, ptr: ArenaPtr) -> (RecordRef<'_>, &dyn sqlexec_arena::ArenaResolve) {
        let size = self.meta.record_size();
        (RecordRef::new(self.arena.resolve_mut(ptr, size)), &self.varlen_arena)
    }

    /// Deep-copy the record at `ptr` into `dst`, re-allocating any
    /// out-of-line varlen payload into `dest_arena`. Combines `get` and
    /// `varlen_resolver` into a single `&mut self` call: both source fields
    /// (`arena` for the record bytes, `varlen_arena` for out-of-line
    /// payloads) are borrowed directly here, so they stay disjoint even
    /// though `get` and `varlen_resolver` each need a different mutability
    /// of `self` when called separately.
    pub fn copy_into(&mut self, ptr: ArenaPtr, dst: &mut RecordRef<'_>, dest_arena: &mut dyn sqlexec_arena::ArenaAlloc) {
        let size = self.meta.record_size();
        let src = RecordRef::new(self.arena.resolve_mut(ptr, size));
        RecordCopier::new(&self.meta).copy(dst, &src, CopyMode::Deep, &self.varlen_arena, Some(dest_arena));
    }

    /// Forward iterator in append order. Unlike the ported `iteratable_record_store`,
    /// there's no need to track page-boundary intervals separately: each
    /// stored `ArenaPtr` already knows which page it lives in.
    pub fn iter(&self) -> impl Iterator<Item = ArenaPtr> + '_ {
        self.order.iter().copied()
    }

    pub fn reset(&mut self) {
        self.order.clear();
        self.arena.reset();
        self.varlen_arena.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::PagePool;
    use sqlexec_record::FieldType;
    use std::sync::Arc;

    fn store() -> IterableRecordStore {
        let pool = Arc::new(PagePool::new(4096));
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        IterableRecordStore::new(meta, LifoArena::new(pool.clone()), LifoArena::new(pool))
    }

    #[test]
    fn append_then_iterate_preserves_order() {
        let mut s = store();
        let mut buf = vec![0u8; s.meta().record_size()];
        let mut values = Vec::new();
        for v in [1, 2, 3] {
            {
                let mut r = RecordRef::new(&mut buf);
                r.set_value::<i32>(0, v);
            }
            let src = RecordRef::new(&mut buf);
            let empty_resolver = sqlexec_arena::FifoArena::new(Arc::new(PagePool::new(64)));
            let ptr = s.append(&src, &empty_resolver);
            values.push(ptr);
        }
        let ptrs: Vec<ArenaPtr> = s.iter().collect();
        let got: Vec<i32> = ptrs.iter().map(|&p| s.get(p).get_value::<i32>(0)).collect();
        assert_eq!(got, vec![1, 2, 3]);
        assert_eq!(s.count(), 3);
    }

    #[test]
    fn reset_clears_store() {
        let mut s = store();
        let mut buf = vec![0u8; s.meta().record_size()];
        let src = RecordRef::new(&mut buf);
        let empty_resolver = sqlexec_arena::FifoArena::new(Arc::new(PagePool::new(64)));
        s.append(&src, &empty_resolver);
        s.reset();
        assert!(s.empty());
        assert_eq!(s.count(), 0);
    }
}
