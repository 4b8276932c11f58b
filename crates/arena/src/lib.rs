//! Page-backed bump allocators, ported from `jogasaki::memory` (the
//! `paged_memory_resource` / `lifo_paged_memory_resource` /
//! `fifo_paged_memory_resource` family).
//!
//! Allocations are returned as relocatable `(page, offset)` handles
//! (`ArenaPtr`) rather than raw pointers, so containers built on top stay
//! testable and movable. Pages themselves are plain `Box<[u8]>`, so no
//! `unsafe` is needed anywhere in this crate.

mod page_pool;

pub use page_pool::{PagePool, DEFAULT_PAGE_SIZE};

use std::sync::Arc;

use sqlexec_helpers::fatal;

/// A relocatable handle into an arena: which page, and the byte offset
/// within it. Never dereferenced directly — always resolved through the
/// arena that produced it. `Pod` so it can be embedded directly in a record's
/// byte layout (the "pointer" field type, and the out-of-line half of
/// `VarlenValue`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ArenaPtr {
    pub page: u32,
    pub offset: u32,
}

/// Common read access shared by `LifoArena` and `FifoArena`, so containers
/// generic over "whichever arena holds my varlen payloads" don't need to pick
/// a concrete type.
pub trait ArenaResolve {
    fn resolve(&self, ptr: ArenaPtr, len: usize) -> &[u8];
}

impl ArenaResolve for LifoArena {
    fn resolve(&self, ptr: ArenaPtr, len: usize) -> &[u8] {
        LifoArena::resolve(self, ptr, len)
    }
}

impl ArenaResolve for FifoArena {
    fn resolve(&self, ptr: ArenaPtr, len: usize) -> &[u8] {
        FifoArena::resolve(self, ptr, len)
    }
}

/// Shared write access for code that allocates varlen payloads without
/// caring whether the backing arena reclaims LIFO-scoped or FIFO-ordered.
pub trait ArenaAlloc: ArenaResolve {
    fn allocate_bytes(&mut self, size: usize, align: usize) -> ArenaPtr;
    fn resolve_bytes_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8];
}

impl ArenaAlloc for LifoArena {
    fn allocate_bytes(&mut self, size: usize, align: usize) -> ArenaPtr {
        self.allocate(size, align)
    }
    fn resolve_bytes_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8] {
        self.resolve_mut(ptr, len)
    }
}

impl ArenaAlloc for FifoArena {
    fn allocate_bytes(&mut self, size: usize, align: usize) -> ArenaPtr {
        self.allocate(size, align)
    }
    fn resolve_bytes_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8] {
        self.resolve_mut(ptr, len)
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// LIFO scratch arena: bump-allocate forward, release wholesale by rewinding
/// to a checkpoint captured at scope entry. Used for operator scratch space
/// and expression evaluation.
pub struct LifoArena {
    pool: Arc<PagePool>,
    page_size: usize,
    pages: Vec<Box<[u8]>>,
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifoCheckpoint {
    page: usize,
    offset: usize,
}

impl LifoArena {
    pub fn new(pool: Arc<PagePool>) -> Self {
        let page_size = pool.page_size();
        Self { pool, page_size, pages: Vec::new(), offset: 0 }
    }

    pub fn checkpoint(&self) -> LifoCheckpoint {
        LifoCheckpoint { page: self.pages.len().saturating_sub(1), offset: self.offset }
    }

    /// Rewind to a checkpoint, returning every page allocated since then to
    /// the shared pool.
    pub fn rewind(&mut self, cp: LifoCheckpoint) {
        if self.pages.is_empty() {
            return;
        }
        while self.pages.len() > cp.page + 1 {
            if let Some(page) = self.pages.pop() {
                self.pool.release(page);
            }
        }
        self.offset = cp.offset;
    }

    pub fn allocate(&mut self, size: usize, align: usize) -> ArenaPtr {
        if size > self.page_size {
            // Oversized allocation: a dedicated page sized exactly to fit.
            let page = vec![0u8; size].into_boxed_slice();
            self.pages.push(page);
            return ArenaPtr { page: (self.pages.len() - 1) as u32, offset: 0 };
        }

        if self.pages.is_empty() {
            self.pages.push(self.pool.acquire());
            self.offset = 0;
        }

        let mut aligned = align_up(self.offset, align);
        if aligned + size > self.page_size {
            self.pages.push(self.pool.acquire());
            self.offset = 0;
            aligned = 0;
        }

        let ptr = ArenaPtr { page: (self.pages.len() - 1) as u32, offset: aligned as u32 };
        self.offset = aligned + size;
        ptr
    }

    pub fn resolve(&self, ptr: ArenaPtr, len: usize) -> &[u8] {
        let page = self.pages.get(ptr.page as usize).unwrap_or_else(|| {
            fatal!("lifo arena: stale page reference {:?}", ptr);
        });
        &page[ptr.offset as usize..ptr.offset as usize + len]
    }

    pub fn resolve_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8] {
        let page = self.pages.get_mut(ptr.page as usize).unwrap_or_else(|| {
            fatal!("lifo arena: stale page reference {:?}", ptr);
        });
        &mut page[ptr.offset as usize..ptr.offset as usize + len]
    }

    /// Release every page back to the pool, leaving the arena equivalent to
    /// a freshly constructed one (§8 invariant 7: `reset` idempotence).
    pub fn reset(&mut self) {
        for page in self.pages.drain(..) {
            self.pool.release(page);
        }
        self.offset = 0;
    }
}

impl Drop for LifoArena {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            self.pool.release(page);
        }
    }
}

/// FIFO queue arena: bump-allocate forward at the head, release from the
/// tail in recorded order via `deallocate_before`.
pub struct FifoArena {
    pool: Arc<PagePool>,
    page_size: usize,
    pages: Vec<Option<Box<[u8]>>>,
    offset: usize,
    floor_page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoCheckpoint {
    page: usize,
    offset: usize,
}

impl FifoArena {
    pub fn new(pool: Arc<PagePool>) -> Self {
        let page_size = pool.page_size();
        Self { pool, page_size, pages: Vec::new(), offset: 0, floor_page: 0 }
    }

    pub fn checkpoint(&self) -> FifoCheckpoint {
        FifoCheckpoint { page: self.pages.len().saturating_sub(1), offset: self.offset }
    }

    pub fn allocate(&mut self, size: usize, align: usize) -> ArenaPtr {
        if size > self.page_size {
            let page = vec![0u8; size].into_boxed_slice();
            self.pages.push(Some(page));
            return ArenaPtr { page: (self.pages.len() - 1) as u32, offset: 0 };
        }

        if self.pages.is_empty() {
            self.pages.push(Some(self.pool.acquire()));
            self.offset = 0;
        }

        let mut aligned = align_up(self.offset, align);
        if aligned + size > self.page_size {
            self.pages.push(Some(self.pool.acquire()));
            self.offset = 0;
            aligned = 0;
        }

        let ptr = ArenaPtr { page: (self.pages.len() - 1) as u32, offset: aligned as u32 };
        self.offset = aligned + size;
        ptr
    }

    /// Release every page strictly before `cp.page` back to the pool. Pages
    /// are never removed from the backing vector (so earlier `ArenaPtr`
    /// handles keep a stable index space); they're replaced with `None`.
    pub fn deallocate_before(&mut self, cp: FifoCheckpoint) {
        for slot in &mut self.pages[self.floor_page..cp.page.min(self.pages.len())] {
            if let Some(page) = slot.take() {
                self.pool.release(page);
            }
        }
        self.floor_page = cp.page;
    }

    pub fn resolve(&self, ptr: ArenaPtr, len: usize) -> &[u8] {
        let page = self
            .pages
            .get(ptr.page as usize)
            .and_then(|p| p.as_ref())
            .unwrap_or_else(|| fatal!("fifo arena: dereference of released page {:?}", ptr));
        &page[ptr.offset as usize..ptr.offset as usize + len]
    }

    pub fn resolve_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8] {
        let page = self
            .pages
            .get_mut(ptr.page as usize)
            .and_then(|p| p.as_mut())
            .unwrap_or_else(|| fatal!("fifo arena: dereference of released page {:?}", ptr));
        &mut page[ptr.offset as usize..ptr.offset as usize + len]
    }

    pub fn reset(&mut self) {
        for slot in self.pages.drain(..).flatten() {
            self.pool.release(slot);
        }
        self.offset = 0;
        self.floor_page = 0;
    }
}

impl Drop for FifoArena {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<PagePool> {
        Arc::new(PagePool::new(256))
    }

    #[test]
    fn lifo_allocate_and_rewind() {
        let mut arena = LifoArena::new(pool());
        let cp = arena.checkpoint();
        let a = arena.allocate(8, 8);
        arena.resolve_mut(a, 8).copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(u64::from_le_bytes(arena.resolve(a, 8).try_into().unwrap()), 42);
        arena.rewind(cp);
        let b = arena.allocate(8, 8);
        assert_eq!(a, b, "rewind must make the next allocation reuse the same slot");
    }

    #[test]
    fn lifo_rolls_to_new_page_on_overflow() {
        let mut arena = LifoArena::new(pool());
        let first = arena.allocate(200, 1);
        let second = arena.allocate(200, 1);
        assert_ne!(first.page, second.page);
    }

    #[test]
    fn fifo_deallocate_before_releases_pages_to_pool() {
        let p = pool();
        let mut arena = FifoArena::new(Arc::clone(&p));
        arena.allocate(200, 1);
        let cp_after_first = arena.checkpoint();
        arena.allocate(200, 1);
        assert_eq!(p.pages_outstanding(), 2);
        arena.deallocate_before(cp_after_first);
        assert_eq!(p.pages_outstanding(), 1);
    }

}
