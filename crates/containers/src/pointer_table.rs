//! Pointer table / partition (§3/§4.C), used by group (shuffle) exchanges:
//! a vector of handles into an [`IterableRecordStore`], sealed and sorted
//! once it reaches a size threshold (a "shard"), bounding per-table sort
//! cost.

use sqlexec_arena::ArenaPtr;

/// A single shard: pointers accumulate by `emplace` until `sort` seals it.
/// Shards are meant to be consumed by a merge reader afterward, so `sort` is
/// a one-way transition in practice (nothing stops calling it twice, but
/// callers should not `emplace` into an already-sorted table).
pub struct PointerTable {
    pointers: Vec<ArenaPtr>,
    shard_limit: usize,
}

impl PointerTable {
    pub fn new(shard_limit: usize) -> Self {
        Self { pointers: Vec::new(), shard_limit }
    }

    pub fn emplace(&mut self, ptr: ArenaPtr) {
        self.pointers.push(ptr);
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pointers.len() >= self.shard_limit
    }

    pub fn sort_by(&mut self, mut cmp: impl FnMut(ArenaPtr, ArenaPtr) -> std::cmp::Ordering) {
        self.pointers.sort_by(|&a, &b| cmp(a, b));
    }

    pub fn iter(&self) -> impl Iterator<Item = ArenaPtr> + '_ {
        self.pointers.iter().copied()
    }
}

/// A growable sequence of shards for one input partition: a fresh
/// [`PointerTable`] starts once the current one reaches its shard limit.
#[derive(Default)]
pub struct PointerTableSeries {
    shard_limit: usize,
    shards: Vec<PointerTable>,
}

impl PointerTableSeries {
    pub fn new(shard_limit: usize) -> Self {
        Self { shard_limit, shards: vec![PointerTable::new(shard_limit)] }
    }

    pub fn emplace(&mut self, ptr: ArenaPtr) {
        if self.shards.last().map(|s| s.is_full()).unwrap_or(true) {
            self.shards.push(PointerTable::new(self.shard_limit));
        }
        self.shards.last_mut().unwrap().emplace(ptr);
    }

    /// Seal every non-empty shard by sorting it with `cmp`.
    pub fn seal(&mut self, mut cmp: impl FnMut(ArenaPtr, ArenaPtr) -> std::cmp::Ordering) {
        for shard in &mut self.shards {
            if !shard.is_empty() {
                shard.sort_by(&mut cmp);
            }
        }
    }

    pub fn shards(&self) -> &[PointerTable] {
        &self.shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_starts_new_shard_once_full() {
        let mut series = PointerTableSeries::new(2);
        for i in 0..5u32 {
            series.emplace(ArenaPtr { page: 0, offset: i });
        }
        assert_eq!(series.shards().len(), 3);
        assert_eq!(series.shards()[0].len(), 2);
        assert_eq!(series.shards()[2].len(), 1);
    }

    #[test]
    fn seal_sorts_each_shard_independently() {
        let mut series = PointerTableSeries::new(3);
        for i in [5u32, 1, 3] {
            series.emplace(ArenaPtr { page: 0, offset: i });
        }
        series.seal(|a, b| a.offset.cmp(&b.offset));
        let offsets: Vec<u32> = series.shards()[0].iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![1, 3, 5]);
    }
}
