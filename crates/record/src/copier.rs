//! Shallow/deep record copying, ported from call sites referencing
//! `jogasaki::accessor::record_copier` in `fifo_record_store.h` /
//! `iteratable_record_store.h`. Fixed-width fields are always copied
//! byte-for-byte; varlen (CHARACTER/OCTET) fields have two modes depending on
//! whether the destination arena outlives the source:
//!
//! - **shallow**: the `VarlenValue` slot is copied as-is, so an out-of-line
//!   payload keeps pointing at the *source* arena. Only valid while the
//!   source arena is still alive.
//! - **deep**: an out-of-line payload is re-allocated into the destination's
//!   varlen arena, so the copy is self-contained.

use sqlexec_arena::{ArenaAlloc, ArenaResolve};

use crate::field_type::FieldType;
use crate::meta::RecordMeta;
use crate::record_ref::RecordRef;
use crate::value::{FieldCodec, VarlenPayload, VarlenValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    Shallow,
    Deep,
}

pub struct RecordCopier<'m> {
    meta: &'m RecordMeta,
}

impl<'m> RecordCopier<'m> {
    pub fn new(meta: &'m RecordMeta) -> Self {
        Self { meta }
    }

    /// Copy every field of `src` into `dst`. `varlen_resolver` resolves
    /// out-of-line payloads in the source record's arena; `dest_arena` is
    /// only used (and only required) in [`CopyMode::Deep`].
    pub fn copy(
        &self,
        dst: &mut RecordRef<'_>,
        src: &RecordRef<'_>,
        mode: CopyMode,
        varlen_resolver: &dyn ArenaResolve,
        mut dest_arena: Option<&mut dyn ArenaAlloc>,
    ) {
        for i in 0..self.meta.field_count() {
            let value_offset = self.meta.value_offset(i);
            if self.meta.is_nullable(i) {
                let nullity_offset = self.meta.nullity_offset(i);
                let is_null = src.is_null(nullity_offset);
                dst.set_null(nullity_offset, is_null);
                if is_null {
                    continue;
                }
            }
            match self.meta.field_type(i) {
                FieldType::Character { .. } | FieldType::Octet { .. } => {
                    let v: VarlenValue = src.get_value(value_offset);
                    let copied = match (mode, v.payload()) {
                        (CopyMode::Shallow, _) => v,
                        (CopyMode::Deep, VarlenPayload::Inline { .. }) => v,
                        (CopyMode::Deep, VarlenPayload::OutOfLine { .. }) => {
                            let bytes = v.bytes(varlen_resolver).to_vec();
                            let arena = dest_arena
                                .as_deref_mut()
                                .expect("deep copy of out-of-line varlen requires a destination arena");
                            VarlenValue::store(&bytes, arena)
                        }
                    };
                    dst.set_value(value_offset, copied);
                }
                other => copy_fixed(dst, src, value_offset, other),
            }
        }
    }
}

fn copy_fixed(dst: &mut RecordRef<'_>, src: &RecordRef<'_>, offset: usize, t: FieldType) {
    macro_rules! mv {
        ($t:ty) => {{
            let v: $t = src.get_value(offset);
            dst.set_value(offset, v);
        }};
    }
    match t {
        FieldType::Boolean => mv!(bool),
        FieldType::Int1 => mv!(i8),
        FieldType::Int2 => mv!(i16),
        FieldType::Int4 => mv!(i32),
        FieldType::Int8 => mv!(i64),
        FieldType::Float4 => mv!(f32),
        FieldType::Float8 => mv!(f64),
        FieldType::Decimal { .. } => mv!(crate::value::Decimal),
        FieldType::Date => mv!(crate::value::Date),
        FieldType::TimeOfDay { .. } => mv!(crate::value::TimeOfDay),
        FieldType::TimePoint { .. } => mv!(crate::value::TimePoint),
        FieldType::BlobRef | FieldType::ClobRef => mv!(crate::value::LobRef),
        FieldType::Pointer => mv!(sqlexec_arena::ArenaPtr),
        FieldType::Character { .. } | FieldType::Octet { .. } => unreachable!("handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::{LifoArena, PagePool};
    use std::sync::Arc;

    #[test]
    fn shallow_copy_preserves_out_of_line_pointer() {
        let meta = RecordMeta::new(vec![FieldType::Character { varying: true, length: None }], vec![false]);
        let pool = Arc::new(PagePool::new(256));
        let mut src_arena = LifoArena::new(pool);
        let long = b"this payload is definitely longer than fifteen bytes";
        let v = VarlenValue::store(long, &mut src_arena);

        let mut src_buf = vec![0u8; meta.record_size()];
        let mut dst_buf = vec![0u8; meta.record_size()];
        {
            let mut src = RecordRef::new(&mut src_buf);
            src.set_value(meta.value_offset(0), v);
        }
        let src = RecordRef::new(&mut src_buf);
        let mut dst = RecordRef::new(&mut dst_buf);
        RecordCopier::new(&meta).copy(&mut dst, &src, CopyMode::Shallow, &src_arena, None);

        let copied: VarlenValue = dst.get_value(meta.value_offset(0));
        assert_eq!(copied.bytes(&src_arena), long);
    }

    #[test]
    fn deep_copy_relocates_out_of_line_payload_to_dest_arena() {
        let meta = RecordMeta::new(vec![FieldType::Character { varying: true, length: None }], vec![false]);
        let pool = Arc::new(PagePool::new(256));
        let mut src_arena = LifoArena::new(pool.clone());
        let mut dst_arena = LifoArena::new(pool);
        let long = b"another payload exceeding the inline capacity of fifteen";
        let v = VarlenValue::store(long, &mut src_arena);

        let mut src_buf = vec![0u8; meta.record_size()];
        let mut dst_buf = vec![0u8; meta.record_size()];
        {
            let mut src = RecordRef::new(&mut src_buf);
            src.set_value(meta.value_offset(0), v);
        }
        let src = RecordRef::new(&mut src_buf);
        let mut dst = RecordRef::new(&mut dst_buf);
        RecordCopier::new(&meta).copy(&mut dst, &src, CopyMode::Deep, &src_arena, Some(&mut dst_arena));

        let copied: VarlenValue = dst.get_value(meta.value_offset(0));
        assert_eq!(copied.bytes(&dst_arena), long);
    }
}
