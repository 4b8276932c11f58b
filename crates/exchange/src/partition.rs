//! Destination-partition assignment for shuffle exchanges (§4.G), ported
//! from jogasaki's `executor::hash` partitioner used ahead of both group and
//! aggregate exchanges to route a record to its owning downstream partition.

use sqlexec_record::RecordRef;

/// 64-bit mixing function (splitmix64 finalizer) applied to each key field's
/// raw bytes in turn, folded together with `^`. Deterministic across
/// processes so a partition assignment is reproducible given the same key
/// and partition count, which the group/aggregate exchange tests rely on.
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for chunk in bytes.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        h ^= mix64(u64::from_le_bytes(buf));
        h = h.wrapping_mul(0x1000_0000_01b3);
    }
    h
}

/// Computes a destination partition index from a fixed set of key field
/// offsets within a record, given the record's own [`sqlexec_record::RecordMeta`].
pub struct Partitioner {
    key_field_indices: Vec<usize>,
    partition_count: usize,
}

impl Partitioner {
    pub fn new(key_field_indices: Vec<usize>, partition_count: usize) -> Self {
        assert!(partition_count > 0, "partition count must be positive");
        Self { key_field_indices, partition_count }
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Hashes the raw bytes backing each key field (nullity bit included, so
    /// NULL keys hash to a stable bucket distinct from any non-null value)
    /// and folds them together before reducing modulo the partition count.
    pub fn partition_of(&self, meta: &sqlexec_record::RecordMeta, record: &RecordRef<'_>) -> usize {
        let mut acc = 0u64;
        for &field in &self.key_field_indices {
            let field_type = meta.field_type(field);
            let offset = meta.value_offset(field);
            let width = field_type.size();
            let is_null = meta.is_nullable(field) && record.is_null(meta.nullity_offset(field));
            let h = if is_null {
                0x9e37_79b9_7f4a_7c15
            } else {
                hash_bytes(&record.as_bytes()[offset..offset + width])
            };
            acc ^= h.wrapping_add(0x517c_c1b7_2722_0a95).wrapping_add(acc.rotate_left(6));
        }
        (acc % self.partition_count as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_record::{FieldType, RecordMeta};

    #[test]
    fn same_key_always_maps_to_same_partition() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        let partitioner = Partitioner::new(vec![0], 8);
        let mut buf = vec![0u8; meta.record_size()];
        let mut r = RecordRef::new(&mut buf);
        r.set_value::<i32>(meta.value_offset(0), 12345);
        let p1 = partitioner.partition_of(&meta, &r);
        let p2 = partitioner.partition_of(&meta, &r);
        assert_eq!(p1, p2);
        assert!(p1 < 8);
    }

    #[test]
    fn null_key_is_stable_and_distinct_from_zero() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![true]);
        let partitioner = Partitioner::new(vec![0], 16);
        let mut buf_null = vec![0u8; meta.record_size()];
        let mut r_null = RecordRef::new(&mut buf_null);
        r_null.set_null(meta.nullity_offset(0), true);

        let mut buf_zero = vec![0u8; meta.record_size()];
        let mut r_zero = RecordRef::new(&mut buf_zero);
        r_zero.set_value::<i32>(meta.value_offset(0), 0);

        assert_eq!(partitioner.partition_of(&meta, &r_null), partitioner.partition_of(&meta, &r_null));
        // Not asserting inequality with the zero case unconditionally (could
        // collide by chance of `% partition_count`), just that both resolve
        // to a valid partition.
        assert!(partitioner.partition_of(&meta, &r_zero) < 16);
    }
}
