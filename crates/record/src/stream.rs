//! Self-describing tag-length stream encoding for result rows and values
//! (§4.B), ported from jogasaki's `executor::io` record-writer wire format.
//! Deserialization is strict: an unrecognized tag is a fatal protocol
//! violation (§7), not a recoverable error.

use sqlexec_helpers::fatal;

use crate::value::{Decimal, TimeOfDay, TimePoint};

const TAG_ROW: u8 = 1;
const TAG_NULL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT4: u8 = 4;
const TAG_FLOAT8: u8 = 5;
const TAG_CHARACTER: u8 = 6;
const TAG_OCTET: u8 = 7;
const TAG_DECIMAL: u8 = 8;
const TAG_DATE: u8 = 9;
const TAG_TIME_OF_DAY: u8 = 10;
const TAG_TIME_POINT: u8 = 11;
const TAG_BLOB: u8 = 12;
const TAG_CLOB: u8 = 13;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamValue {
    Row(u64),
    Null,
    Int(i64),
    Float4(f32),
    Float8(f64),
    Character(Vec<u8>),
    Octet(Vec<u8>),
    Decimal(Decimal),
    Date(i32),
    TimeOfDay(TimeOfDay),
    TimePoint(TimePoint),
    Blob { provider: u8, id: u64, reference_tag: u64 },
    Clob { provider: u8, id: u64, reference_tag: u64 },
}

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &mut &[u8]) -> u64 {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let Some((&byte, rest)) = bytes.split_first() else {
            fatal!("stream decode: truncated varint");
        };
        *bytes = rest;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    result
}

fn take(bytes: &mut &[u8], n: usize) -> Vec<u8> {
    if bytes.len() < n {
        fatal!("stream decode: truncated payload, need {n} bytes, have {}", bytes.len());
    }
    let (head, rest) = bytes.split_at(n);
    *bytes = rest;
    head.to_vec()
}

pub struct Encoder {
    buf: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn row(&mut self, field_count: u64) -> &mut Self {
        self.buf.push(TAG_ROW);
        write_varint(&mut self.buf, field_count);
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.buf.push(TAG_NULL);
        self
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        self.buf.push(TAG_INT);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn float4(&mut self, v: f32) -> &mut Self {
        self.buf.push(TAG_FLOAT4);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn float8(&mut self, v: f64) -> &mut Self {
        self.buf.push(TAG_FLOAT8);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn character(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.push(TAG_CHARACTER);
        write_varint(&mut self.buf, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn octet(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.push(TAG_OCTET);
        write_varint(&mut self.buf, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn decimal(&mut self, d: Decimal) -> &mut Self {
        self.buf.push(TAG_DECIMAL);
        self.buf.push(d.sign as u8);
        self.buf.extend_from_slice(&d.hi.to_le_bytes());
        self.buf.extend_from_slice(&d.lo.to_le_bytes());
        self.buf.extend_from_slice(&d.exponent.to_le_bytes());
        self
    }

    pub fn date(&mut self, days: i32) -> &mut Self {
        self.buf.push(TAG_DATE);
        self.buf.extend_from_slice(&days.to_le_bytes());
        self
    }

    pub fn time_of_day(&mut self, t: TimeOfDay, with_offset: bool) -> &mut Self {
        self.buf.push(TAG_TIME_OF_DAY);
        self.buf.push(u8::from(with_offset));
        self.buf.extend_from_slice(&t.nanos_since_midnight.to_le_bytes());
        if with_offset {
            self.buf.extend_from_slice(&t.offset_minutes.to_le_bytes());
        }
        self
    }

    pub fn time_point(&mut self, t: TimePoint, with_offset: bool) -> &mut Self {
        self.buf.push(TAG_TIME_POINT);
        self.buf.push(u8::from(with_offset));
        self.buf.extend_from_slice(&t.epoch_seconds.to_le_bytes());
        self.buf.extend_from_slice(&t.nanos.to_le_bytes());
        if with_offset {
            self.buf.extend_from_slice(&t.offset_minutes.to_le_bytes());
        }
        self
    }

    pub fn blob(&mut self, provider: u8, id: u64, reference_tag: u64) -> &mut Self {
        self.buf.push(TAG_BLOB);
        self.buf.push(provider);
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.extend_from_slice(&reference_tag.to_le_bytes());
        self
    }

    pub fn clob(&mut self, provider: u8, id: u64, reference_tag: u64) -> &mut Self {
        self.buf.push(TAG_CLOB);
        self.buf.push(provider);
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.extend_from_slice(&reference_tag.to_le_bytes());
        self
    }
}

/// Decode the next tagged value. Aborts the process on an unrecognized tag
/// or truncated payload (§7 fatal class: "unknown wire tag").
pub fn decode_one(bytes: &mut &[u8]) -> StreamValue {
    let Some((&tag, rest)) = bytes.split_first() else {
        fatal!("stream decode: empty input");
    };
    *bytes = rest;
    match tag {
        TAG_ROW => StreamValue::Row(read_varint(bytes)),
        TAG_NULL => StreamValue::Null,
        TAG_INT => StreamValue::Int(i64::from_le_bytes(take(bytes, 8).try_into().unwrap())),
        TAG_FLOAT4 => StreamValue::Float4(f32::from_le_bytes(take(bytes, 4).try_into().unwrap())),
        TAG_FLOAT8 => StreamValue::Float8(f64::from_le_bytes(take(bytes, 8).try_into().unwrap())),
        TAG_CHARACTER => {
            let len = read_varint(bytes) as usize;
            StreamValue::Character(take(bytes, len))
        }
        TAG_OCTET => {
            let len = read_varint(bytes) as usize;
            StreamValue::Octet(take(bytes, len))
        }
        TAG_DECIMAL => {
            let sign = take(bytes, 1)[0] as i8;
            let hi = u64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            let lo = u64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            let exponent = i32::from_le_bytes(take(bytes, 4).try_into().unwrap());
            StreamValue::Decimal(Decimal { sign, hi, lo, exponent })
        }
        TAG_DATE => StreamValue::Date(i32::from_le_bytes(take(bytes, 4).try_into().unwrap())),
        TAG_TIME_OF_DAY => {
            let with_offset = take(bytes, 1)[0] != 0;
            let nanos_since_midnight = i64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            let offset_minutes =
                if with_offset { i32::from_le_bytes(take(bytes, 4).try_into().unwrap()) } else { 0 };
            StreamValue::TimeOfDay(TimeOfDay { nanos_since_midnight, offset_minutes })
        }
        TAG_TIME_POINT => {
            let with_offset = take(bytes, 1)[0] != 0;
            let epoch_seconds = i64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            let nanos = i32::from_le_bytes(take(bytes, 4).try_into().unwrap());
            let offset_minutes =
                if with_offset { i32::from_le_bytes(take(bytes, 4).try_into().unwrap()) } else { 0 };
            StreamValue::TimePoint(TimePoint { epoch_seconds, nanos, offset_minutes })
        }
        TAG_BLOB | TAG_CLOB => {
            let provider = take(bytes, 1)[0];
            let id = u64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            let reference_tag = u64::from_le_bytes(take(bytes, 8).try_into().unwrap());
            if tag == TAG_BLOB {
                StreamValue::Blob { provider, id, reference_tag }
            } else {
                StreamValue::Clob { provider, id, reference_tag }
            }
        }
        other => fatal!("stream decode: unknown tag {other}"),
    }
}

/// Decode an entire `row(n)` frame followed by `n` values.
pub fn decode_row(bytes: &mut &[u8]) -> Vec<StreamValue> {
    match decode_one(bytes) {
        StreamValue::Row(n) => (0..n).map(|_| decode_one(bytes)).collect(),
        other => fatal!("stream decode: expected row frame, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_roundtrip() {
        let mut e = Encoder::new();
        e.row(2).int(7).character(b"abc");
        let bytes = e.into_bytes();
        let mut cursor = bytes.as_slice();
        let row = decode_row(&mut cursor);
        assert_eq!(row, vec![StreamValue::Int(7), StreamValue::Character(b"abc".to_vec())]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn null_roundtrip() {
        let mut e = Encoder::new();
        e.null();
        let bytes = e.into_bytes();
        let mut cursor = bytes.as_slice();
        assert_eq!(decode_one(&mut cursor), StreamValue::Null);
    }

    #[test]
    fn decimal_roundtrip() {
        let d = Decimal { sign: 1, hi: 0, lo: 12345, exponent: -2 };
        let mut e = Encoder::new();
        e.decimal(d);
        let bytes = e.into_bytes();
        let mut cursor = bytes.as_slice();
        assert_eq!(decode_one(&mut cursor), StreamValue::Decimal(d));
    }
}
