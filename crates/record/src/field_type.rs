use crate::value::{Decimal, FieldCodec, LobRef, TimeOfDay, TimePoint};

/// Every scalar field kind a record may carry, mirroring jogasaki's
/// `meta::field_type` variants. Carries just enough of each type's parameters
/// (precision/scale, varying/fixed, with/without offset) to compute a layout;
/// the engine's type checker is responsible for everything above that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Int1,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Decimal { precision: u8, scale: i8 },
    Character { varying: bool, length: Option<u32> },
    Octet { varying: bool, length: Option<u32> },
    Date,
    TimeOfDay { with_offset: bool },
    TimePoint { with_offset: bool },
    BlobRef,
    ClobRef,
    /// Internal-only: an arena pointer appended to group/shuffle keys so a
    /// sorted key run can be joined back to its value record.
    Pointer,
}

impl FieldType {
    /// Byte footprint this field occupies in a record's fixed-size area.
    /// Varying-length character/octet fields still occupy a fixed
    /// `VarlenValue` slot (16 bytes) in the record; their actual payload
    /// either lives inline in that slot or out-of-line in a varlen arena.
    ///
    /// These must match each type's [`FieldCodec::WIDTH`] exactly — the
    /// layout computer and the byte-level get/set in `record_ref` both have
    /// to agree on where a field starts and ends. We use explicit widths
    /// here rather than `size_of::<Decimal>()` etc. because those Rust
    /// structs carry compiler-inserted padding that has nothing to do with
    /// the on-wire/on-record byte layout `FieldCodec` defines.
    pub fn size(&self) -> usize {
        match self {
            FieldType::Boolean | FieldType::Int1 => 1,
            FieldType::Int2 => 2,
            FieldType::Int4 | FieldType::Float4 => 4,
            FieldType::Int8 | FieldType::Float8 => 8,
            FieldType::Date => 4,
            FieldType::Decimal { .. } => Decimal::WIDTH,
            FieldType::Character { .. } | FieldType::Octet { .. } => crate::value::VARLEN_VALUE_SIZE,
            FieldType::TimeOfDay { .. } => TimeOfDay::WIDTH,
            FieldType::TimePoint { .. } => TimePoint::WIDTH,
            FieldType::BlobRef | FieldType::ClobRef => LobRef::WIDTH,
            FieldType::Pointer => sqlexec_arena::ArenaPtr::WIDTH,
        }
    }

    /// Natural alignment of the field, used by the layout computer. Chosen
    /// to be the largest power-of-two divisor of each `FieldCodec::WIDTH`
    /// capped at 8, since none of these types need more than 8-byte
    /// alignment and the record buffer itself is only byte-addressed.
    pub fn align(&self) -> usize {
        match self {
            FieldType::Boolean | FieldType::Int1 => 1,
            FieldType::Int2 => 2,
            FieldType::Int4 | FieldType::Float4 | FieldType::Date => 4,
            FieldType::Int8 | FieldType::Float8 => 8,
            FieldType::Decimal { .. } => 8,
            FieldType::Character { .. } | FieldType::Octet { .. } => 4,
            FieldType::TimeOfDay { .. } => 8,
            FieldType::TimePoint { .. } => 8,
            FieldType::BlobRef | FieldType::ClobRef => 8,
            FieldType::Pointer => 4,
        }
    }

    pub fn is_varlen(&self) -> bool {
        matches!(self, FieldType::Character { .. } | FieldType::Octet { .. })
    }
}
