//! Fixed-width value representations used inside a record's byte layout,
//! ported from jogasaki's `accessor::record_ref`-adjacent value types
//! (`runtime_t<kind::decimal>`, `runtime_t<kind::time_of_day>`, ...).
//!
//! Every type here implements [`FieldCodec`] by hand rather than leaning on
//! `bytemuck::Pod`: several of these (in particular [`Decimal`]) would carry
//! compiler-inserted padding under a naive `#[repr(C)]`, and `Pod` requires
//! none. Spelling out `encode`/`decode` keeps the byte layout explicit and
//! avoids relying on padding guarantees we can't check without a build.

use sqlexec_arena::ArenaPtr;

/// A fixed-width value that can be read from / written into a record's raw
/// byte buffer at a known offset. No implementor owns allocation; encoding
/// always writes into a caller-supplied buffer of exactly `WIDTH` bytes.
pub trait FieldCodec: Sized + Copy {
    const WIDTH: usize;
    fn encode(&self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_int_codec {
    ($t:ty, $w:expr) => {
        impl FieldCodec for $t {
            const WIDTH: usize = $w;
            fn encode(&self, out: &mut [u8]) {
                out[..$w].copy_from_slice(&self.to_le_bytes());
            }
            fn decode(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes[..$w].try_into().unwrap())
            }
        }
    };
}

impl_int_codec!(i8, 1);
impl_int_codec!(i16, 2);
impl_int_codec!(i32, 4);
impl_int_codec!(i64, 8);
impl_int_codec!(f32, 4);
impl_int_codec!(f64, 8);

impl FieldCodec for bool {
    const WIDTH: usize = 1;
    fn encode(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }
    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl FieldCodec for ArenaPtr {
    const WIDTH: usize = 8;
    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.page.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
    }
    fn decode(bytes: &[u8]) -> Self {
        ArenaPtr {
            page: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            offset: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

/// DATE: days since epoch (1970-01-01), matching jogasaki's `date` runtime
/// type (backed by `takatori::datetime::date`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub i32);

impl FieldCodec for Date {
    const WIDTH: usize = 4;
    fn encode(&self, out: &mut [u8]) {
        self.0.encode(out);
    }
    fn decode(bytes: &[u8]) -> Self {
        Date(i32::decode(bytes))
    }
}

/// TIME OF DAY, optionally WITH TIME ZONE: nanoseconds since midnight plus an
/// optional UTC offset in minutes (only meaningful when the field type says
/// `with_offset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeOfDay {
    pub nanos_since_midnight: i64,
    pub offset_minutes: i32,
}

impl FieldCodec for TimeOfDay {
    const WIDTH: usize = 12;
    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.nanos_since_midnight.to_le_bytes());
        out[8..12].copy_from_slice(&self.offset_minutes.to_le_bytes());
    }
    fn decode(bytes: &[u8]) -> Self {
        TimeOfDay {
            nanos_since_midnight: i64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            offset_minutes: i32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        }
    }
}

/// TIMESTAMP, optionally WITH TIME ZONE: seconds + nanos since epoch plus an
/// optional UTC offset in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimePoint {
    pub epoch_seconds: i64,
    pub nanos: i32,
    pub offset_minutes: i32,
}

impl FieldCodec for TimePoint {
    const WIDTH: usize = 16;
    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.epoch_seconds.to_le_bytes());
        out[8..12].copy_from_slice(&self.nanos.to_le_bytes());
        out[12..16].copy_from_slice(&self.offset_minutes.to_le_bytes());
    }
    fn decode(bytes: &[u8]) -> Self {
        TimePoint {
            epoch_seconds: i64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            nanos: i32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            offset_minutes: i32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        }
    }
}

/// Signed decimal triple, matching jogasaki's `decimal::triple`:
/// `value = sign * (hi * 2^64 + lo) * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub sign: i8,
    pub hi: u64,
    pub lo: u64,
    pub exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal { sign: 0, hi: 0, lo: 0, exponent: 0 };

    pub fn is_zero(&self) -> bool {
        self.sign == 0 || (self.hi == 0 && self.lo == 0)
    }
}

impl FieldCodec for Decimal {
    const WIDTH: usize = 21;
    fn encode(&self, out: &mut [u8]) {
        out[0] = self.sign as u8;
        out[1..9].copy_from_slice(&self.hi.to_le_bytes());
        out[9..17].copy_from_slice(&self.lo.to_le_bytes());
        out[17..21].copy_from_slice(&self.exponent.to_le_bytes());
    }
    fn decode(bytes: &[u8]) -> Self {
        Decimal {
            sign: bytes[0] as i8,
            hi: u64::from_le_bytes(bytes[1..9].try_into().unwrap()),
            lo: u64::from_le_bytes(bytes[9..17].try_into().unwrap()),
            exponent: i32::from_le_bytes(bytes[17..21].try_into().unwrap()),
        }
    }
}

/// Reference to a large object, never materialized in a record: `(provider,
/// id)` identify the blob/clob in the LOB store the engine delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LobRef {
    pub provider: u8,
    pub id: u64,
}

impl FieldCodec for LobRef {
    const WIDTH: usize = 9;
    fn encode(&self, out: &mut [u8]) {
        out[0] = self.provider;
        out[1..9].copy_from_slice(&self.id.to_le_bytes());
    }
    fn decode(bytes: &[u8]) -> Self {
        LobRef { provider: bytes[0], id: u64::from_le_bytes(bytes[1..9].try_into().unwrap()) }
    }
}

/// Fixed 16-byte slot for CHARACTER/OCTET fields: short-string optimized, up
/// to 15 bytes stored inline, longer payloads stored out-of-line in a varlen
/// arena referenced by an [`ArenaPtr`] + explicit length.
pub const VARLEN_VALUE_SIZE: usize = 16;
pub const VARLEN_INLINE_CAPACITY: usize = 15;
const OUT_OF_LINE_TAG: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarlenValue {
    bytes: [u8; VARLEN_VALUE_SIZE],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarlenPayload {
    Inline { len: u8 },
    OutOfLine { ptr: ArenaPtr, len: u32 },
}

impl VarlenValue {
    /// Store `data` inline. Panics if longer than [`VARLEN_INLINE_CAPACITY`];
    /// callers must route longer payloads through [`VarlenValue::out_of_line`].
    pub fn inline(data: &[u8]) -> Self {
        assert!(data.len() <= VARLEN_INLINE_CAPACITY, "varlen inline payload too long: {}", data.len());
        let mut bytes = [0u8; VARLEN_VALUE_SIZE];
        bytes[0] = data.len() as u8;
        bytes[1..1 + data.len()].copy_from_slice(data);
        Self { bytes }
    }

    pub fn out_of_line(ptr: ArenaPtr, len: u32) -> Self {
        let mut bytes = [0u8; VARLEN_VALUE_SIZE];
        bytes[0] = OUT_OF_LINE_TAG;
        bytes[1..5].copy_from_slice(&ptr.page.to_le_bytes());
        bytes[5..9].copy_from_slice(&ptr.offset.to_le_bytes());
        bytes[9..13].copy_from_slice(&len.to_le_bytes());
        Self { bytes }
    }

    /// Build the representation appropriate for `data`'s length, writing the
    /// out-of-line payload into `arena` when it doesn't fit inline. Generic
    /// over [`sqlexec_arena::ArenaAlloc`] so both the LIFO scratch arena and
    /// the FIFO queue arena can back out-of-line payloads.
    pub fn store(data: &[u8], arena: &mut dyn sqlexec_arena::ArenaAlloc) -> Self {
        if data.len() <= VARLEN_INLINE_CAPACITY {
            Self::inline(data)
        } else {
            let ptr = arena.allocate_bytes(data.len(), 1);
            arena.resolve_bytes_mut(ptr, data.len()).copy_from_slice(data);
            Self::out_of_line(ptr, data.len() as u32)
        }
    }

    pub fn payload(&self) -> VarlenPayload {
        if self.bytes[0] == OUT_OF_LINE_TAG {
            let page = u32::from_le_bytes(self.bytes[1..5].try_into().unwrap());
            let offset = u32::from_le_bytes(self.bytes[5..9].try_into().unwrap());
            let len = u32::from_le_bytes(self.bytes[9..13].try_into().unwrap());
            VarlenPayload::OutOfLine { ptr: ArenaPtr { page, offset }, len }
        } else {
            VarlenPayload::Inline { len: self.bytes[0] }
        }
    }

    pub fn len(&self) -> usize {
        match self.payload() {
            VarlenPayload::Inline { len } => len as usize,
            VarlenPayload::OutOfLine { len, .. } => len as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the byte slice. Inline payloads borrow from `self`; out-of-line
    /// payloads borrow from `resolver` (the arena that owns the out-of-line
    /// allocation) and so have the shorter of the two lifetimes.
    pub fn bytes<'s, 'a: 's>(&'s self, resolver: &'a dyn sqlexec_arena::ArenaResolve) -> &'s [u8] {
        match self.payload() {
            VarlenPayload::Inline { len } => &self.bytes[1..1 + len as usize],
            VarlenPayload::OutOfLine { ptr, len } => resolver.resolve(ptr, len as usize),
        }
    }
}

impl FieldCodec for VarlenValue {
    const WIDTH: usize = VARLEN_VALUE_SIZE;
    fn encode(&self, out: &mut [u8]) {
        out[..VARLEN_VALUE_SIZE].copy_from_slice(&self.bytes);
    }
    fn decode(bytes: &[u8]) -> Self {
        let mut b = [0u8; VARLEN_VALUE_SIZE];
        b.copy_from_slice(&bytes[..VARLEN_VALUE_SIZE]);
        Self { bytes: b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varlen_inline_roundtrip() {
        let v = VarlenValue::inline(b"hello");
        assert_eq!(v.len(), 5);
        match v.payload() {
            VarlenPayload::Inline { len } => assert_eq!(len, 5),
            _ => panic!("expected inline"),
        }
    }

    #[test]
    fn varlen_out_of_line_roundtrip() {
        let ptr = ArenaPtr { page: 3, offset: 128 };
        let v = VarlenValue::out_of_line(ptr, 4096);
        assert_eq!(v.len(), 4096);
        match v.payload() {
            VarlenPayload::OutOfLine { ptr: p, len } => {
                assert_eq!(p, ptr);
                assert_eq!(len, 4096);
            }
            _ => panic!("expected out-of-line"),
        }
    }

    #[test]
    fn decimal_codec_roundtrip() {
        let d = Decimal { sign: -1, hi: 7, lo: 42, exponent: -3 };
        let mut buf = [0u8; Decimal::WIDTH];
        d.encode(&mut buf);
        assert_eq!(Decimal::decode(&buf), d);
    }
}
