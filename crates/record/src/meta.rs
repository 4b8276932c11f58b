//! Record metadata and layout computation, ported from jogasaki's
//! `meta::record_meta` / `meta::record_layout_creator`
//! (`test/jogasaki/meta/record_layout_creator_test.cpp` fixes the expected
//! placement rule this mirrors).

use crate::field_type::FieldType;

/// Ordered field types plus a nullability bitmap, plus every offset derived
/// from them. Two metadata objects compare equal iff their field sequence
/// *and* nullability both match (§3); `record_size`/`offsets` are a pure
/// function of those two inputs, so comparing them is redundant but harmless
/// to include in the derived `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    types: Vec<FieldType>,
    nullable: Vec<bool>,
    value_offsets: Vec<usize>,
    nullity_offsets: Vec<Option<usize>>,
    alignment: usize,
    record_size: usize,
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

impl RecordMeta {
    /// `nullable[i]` says whether field `i` may hold NULL. Layout rule:
    /// nullity bits occupy a leading contiguous bitmap (byte-aligned), then
    /// fields are placed in declaration order at increasing offsets, each
    /// aligned to its own natural alignment.
    pub fn new(types: Vec<FieldType>, nullable: Vec<bool>) -> Self {
        assert_eq!(types.len(), nullable.len(), "types/nullable length mismatch");

        let nullable_count = nullable.iter().filter(|&&b| b).count();
        let bitmap_bytes = nullable_count.div_ceil(8);

        let mut nullity_offsets = Vec::with_capacity(types.len());
        let mut bit_cursor = 0usize;
        for &n in &nullable {
            if n {
                nullity_offsets.push(Some(bit_cursor));
                bit_cursor += 1;
            } else {
                nullity_offsets.push(None);
            }
        }

        let mut cursor = bitmap_bytes;
        let mut value_offsets = Vec::with_capacity(types.len());
        let mut max_align = 1usize;
        for t in &types {
            let align = t.align();
            max_align = max_align.max(align);
            cursor = align_up(cursor, align);
            value_offsets.push(cursor);
            cursor += t.size();
        }
        let record_size = align_up(cursor, max_align);

        Self {
            types,
            nullable,
            value_offsets,
            nullity_offsets,
            alignment: max_align,
            record_size,
        }
    }

    pub fn field_count(&self) -> usize {
        self.types.len()
    }

    pub fn field_type(&self, index: usize) -> FieldType {
        self.types[index]
    }

    pub fn is_nullable(&self, index: usize) -> bool {
        self.nullable[index]
    }

    pub fn value_offset(&self, index: usize) -> usize {
        self.value_offsets[index]
    }

    /// Bit offset (from the start of the record) of field `index`'s nullity
    /// bit. Panics if the field isn't nullable; callers are expected to check
    /// `is_nullable` first, mirroring the source's "meaningful only when
    /// nullable" contract.
    pub fn nullity_offset(&self, index: usize) -> usize {
        self.nullity_offsets[index].expect("field is not nullable")
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    /// Append an internal `Pointer` field used by group/shuffle keys to hang
    /// the value record off a sorted key run without an extra lookup (§4.B).
    pub fn with_appended_pointer(&self) -> Self {
        let mut types = self.types.clone();
        let mut nullable = self.nullable.clone();
        types.push(FieldType::Pointer);
        nullable.push(false);
        Self::new(types, nullable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_places_nullity_bitmap_first() {
        let meta = RecordMeta::new(
            vec![FieldType::Int4, FieldType::Int8],
            vec![true, true],
        );
        // 2 nullable fields -> 1 bitmap byte, then int4 at offset 4 (aligned), then int8 at 8.
        assert_eq!(meta.nullity_offset(0), 0);
        assert_eq!(meta.nullity_offset(1), 1);
        assert_eq!(meta.value_offset(0), 4);
        assert_eq!(meta.value_offset(1), 8);
        assert_eq!(meta.record_size(), 16);
    }

    #[test]
    fn layout_no_nullable_fields_has_no_bitmap() {
        let meta = RecordMeta::new(vec![FieldType::Int1, FieldType::Int4], vec![false, false]);
        assert_eq!(meta.value_offset(0), 0);
        assert_eq!(meta.value_offset(1), 4);
    }

    #[test]
    fn equality_requires_identical_nullability() {
        let a = RecordMeta::new(vec![FieldType::Int4], vec![true]);
        let b = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        assert_ne!(a, b);
    }
}
