use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

/// Default page size jogasaki uses for its paged memory resources.
pub const DEFAULT_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Process-wide pool of fixed-size pages, shared by every arena. Acquisition
/// and release are both lock-free (a `SegQueue` free-list with allocation of
/// fresh pages as the fallback), matching §5's "per-worker free-list with a
/// shared refill" policy — in this single-process model the free-list is
/// shared directly rather than sharded per worker, since `SegQueue` push/pop
/// already avoids contention.
pub struct PagePool {
    page_size: usize,
    free: SegQueue<Box<[u8]>>,
    outstanding: AtomicUsize,
}

impl PagePool {
    pub fn new(page_size: usize) -> Self {
        Self { page_size, free: SegQueue::new(), outstanding: AtomicUsize::new(0) }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn acquire(&self) -> Box<[u8]> {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        match self.free.pop() {
            Some(page) => page,
            None => vec![0u8; self.page_size].into_boxed_slice(),
        }
    }

    pub fn release(&self, mut page: Box<[u8]>) {
        page.fill(0);
        self.free.push(page);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of pages currently checked out by arenas (not sitting on the
    /// free-list). Diagnostics only.
    pub fn pages_outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
