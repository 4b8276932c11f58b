//! Field-by-field record comparator (§4.G/§8 invariant 2/3), ported from
//! jogasaki's `executor::comparator` (`test/jogasaki/comparator_test.cpp`
//! fixes the field-by-field, type-dispatched contract this mirrors). Used by
//! group/aggregate exchanges to order pointer tables and by cogroup joins to
//! compare two upstream keys, without re-encoding an order-preserving byte
//! key on every comparison.

use std::cmp::Ordering;

use crate::field_type::FieldType;
use crate::key::{NullsOrder, SortOrder};
use crate::meta::RecordMeta;
use crate::record_ref::RecordRef;
use crate::value::{Date, Decimal, TimeOfDay, TimePoint};

/// Per-field ordering: ascending/descending plus where NULL sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOrder {
    pub order: SortOrder,
    pub nulls: NullsOrder,
}

impl Default for FieldOrder {
    fn default() -> Self {
        Self { order: SortOrder::Ascending, nulls: NullsOrder::First }
    }
}

/// Compares two records sharing `meta`, field by field in declaration
/// order, stopping at the first field that orders unequal. Decimal values
/// compare by mathematical value (sign, then magnitude scaled by exponent),
/// matching the numeric (not bitwise) comparison jogasaki's comparator uses.
pub struct RecordComparator<'m> {
    meta: &'m RecordMeta,
    orders: Vec<FieldOrder>,
}

impl<'m> RecordComparator<'m> {
    /// One [`FieldOrder`] per field of `meta`, in order. Panics if the
    /// lengths disagree — a mismatched comparator is a construction bug,
    /// not a runtime condition to recover from.
    pub fn new(meta: &'m RecordMeta, orders: Vec<FieldOrder>) -> Self {
        assert_eq!(orders.len(), meta.field_count(), "comparator order count must match field count");
        Self { meta, orders }
    }

    /// All fields ascending, nulls first — the common case for shuffle keys.
    pub fn ascending(meta: &'m RecordMeta) -> Self {
        let orders = vec![FieldOrder::default(); meta.field_count()];
        Self::new(meta, orders)
    }

    pub fn compare(&self, a: &RecordRef<'_>, b: &RecordRef<'_>) -> Ordering {
        for i in 0..self.meta.field_count() {
            let field_order = self.orders[i];
            let value_offset = self.meta.value_offset(i);
            let ordering = if self.meta.is_nullable(i) {
                let nullity_offset = self.meta.nullity_offset(i);
                let a_null = a.is_null(nullity_offset);
                let b_null = b.is_null(nullity_offset);
                match (a_null, b_null) {
                    (true, true) => Ordering::Equal,
                    (true, false) => nulls_first_ordering(field_order.nulls, true),
                    (false, true) => nulls_first_ordering(field_order.nulls, false),
                    (false, false) => compare_value(self.meta.field_type(i), a, b, value_offset),
                }
            } else {
                compare_value(self.meta.field_type(i), a, b, value_offset)
            };
            let ordering = if field_order.order == SortOrder::Descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// True iff every field compares equal — the "same group" predicate a
    /// group exchange's merge reader uses to detect a group boundary.
    pub fn equal(&self, a: &RecordRef<'_>, b: &RecordRef<'_>) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

fn nulls_first_ordering(nulls: NullsOrder, lhs_is_null: bool) -> Ordering {
    let null_is_less = nulls == NullsOrder::First;
    match (lhs_is_null, null_is_less) {
        (true, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Less,
    }
}

/// Mathematical comparison of two decimal triples: `sign * (hi*2^64+lo) *
/// 10^exponent`. Rescales the smaller-exponent side's magnitude up rather
/// than doing floating-point math, via a `u128` widening (safe: engine
/// decimals carry at most 38 digits of precision, far under `u128::MAX`
/// divided by any `10^k` needed here).
pub fn compare_decimal(a: Decimal, b: Decimal) -> Ordering {
    let sign = |d: Decimal| if d.is_zero() { 0i8 } else { d.sign };
    let (sa, sb) = (sign(a), sign(b));
    if sa != sb {
        return sa.cmp(&sb);
    }
    if sa == 0 {
        return Ordering::Equal;
    }
    let mag = |d: Decimal| (d.hi as u128) << 64 | d.lo as u128;
    let (ma, mb) = (mag(a), mag(b));
    let (scaled_a, scaled_b) = match a.exponent.cmp(&b.exponent) {
        Ordering::Equal => (ma, mb),
        Ordering::Less => {
            let shift = (b.exponent - a.exponent) as u32;
            (ma, mb.saturating_mul(10u128.saturating_pow(shift)))
        }
        Ordering::Greater => {
            let shift = (a.exponent - b.exponent) as u32;
            (ma.saturating_mul(10u128.saturating_pow(shift)), mb)
        }
    };
    let unsigned_ordering = scaled_a.cmp(&scaled_b);
    if sa < 0 { unsigned_ordering.reverse() } else { unsigned_ordering }
}

fn compare_value(t: FieldType, a: &RecordRef<'_>, b: &RecordRef<'_>, offset: usize) -> Ordering {
    match t {
        FieldType::Boolean => a.get_value::<bool>(offset).cmp(&b.get_value::<bool>(offset)),
        FieldType::Int1 => a.get_value::<i8>(offset).cmp(&b.get_value::<i8>(offset)),
        FieldType::Int2 => a.get_value::<i16>(offset).cmp(&b.get_value::<i16>(offset)),
        FieldType::Int4 => a.get_value::<i32>(offset).cmp(&b.get_value::<i32>(offset)),
        FieldType::Int8 => a.get_value::<i64>(offset).cmp(&b.get_value::<i64>(offset)),
        FieldType::Float4 => a.get_value::<f32>(offset).total_cmp(&b.get_value::<f32>(offset)),
        FieldType::Float8 => a.get_value::<f64>(offset).total_cmp(&b.get_value::<f64>(offset)),
        FieldType::Decimal { .. } => compare_decimal(a.get_value::<Decimal>(offset), b.get_value::<Decimal>(offset)),
        FieldType::Date => a.get_value::<Date>(offset).cmp(&b.get_value::<Date>(offset)),
        FieldType::TimeOfDay { .. } => {
            a.get_value::<TimeOfDay>(offset).nanos_since_midnight.cmp(&b.get_value::<TimeOfDay>(offset).nanos_since_midnight)
        }
        FieldType::TimePoint { .. } => {
            let (va, vb) = (a.get_value::<TimePoint>(offset), b.get_value::<TimePoint>(offset));
            (va.epoch_seconds, va.nanos).cmp(&(vb.epoch_seconds, vb.nanos))
        }
        FieldType::Character { .. } | FieldType::Octet { .. } => {
            // Varlen fields compare by their inline prefix only; callers
            // that need full-payload ordering for out-of-line strings
            // resolve and compare bytes themselves (group/aggregate key
            // columns are expected to fit inline in practice).
            let (va, vb) = (a.get_value::<crate::value::VarlenValue>(offset), b.get_value::<crate::value::VarlenValue>(offset));
            match (va.payload(), vb.payload()) {
                (crate::value::VarlenPayload::Inline { .. }, crate::value::VarlenPayload::Inline { .. }) => {
                    va.len().cmp(&vb.len()).then_with(|| {
                        // Inline bytes live in the fixed slot; compare raw bytes lexicographically.
                        a.as_bytes()[offset..offset + 16].cmp(&b.as_bytes()[offset..offset + 16])
                    })
                }
                _ => a.as_bytes()[offset..offset + 16].cmp(&b.as_bytes()[offset..offset + 16]),
            }
        }
        FieldType::BlobRef | FieldType::ClobRef => {
            a.as_bytes()[offset..offset + 9].cmp(&b.as_bytes()[offset..offset + 9])
        }
        FieldType::Pointer => a.as_bytes()[offset..offset + 8].cmp(&b.as_bytes()[offset..offset + 8]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_i4_i8() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int4, FieldType::Int8], vec![false, false])
    }

    fn rec<'a>(buf: &'a mut [u8], meta: &RecordMeta, x: i32, y: i64) -> RecordRef<'a> {
        let mut r = RecordRef::new(buf);
        r.set_value::<i32>(meta.value_offset(0), x);
        r.set_value::<i64>(meta.value_offset(1), y);
        r
    }

    #[test]
    fn compares_leading_field_first() {
        let meta = meta_i4_i8();
        let mut ba = vec![0u8; meta.record_size()];
        let mut bb = vec![0u8; meta.record_size()];
        let mut bc = vec![0u8; meta.record_size()];
        let a = rec(&mut ba, &meta, 1, 1000);
        let b = rec(&mut bb, &meta, 2, 2000);
        let c = rec(&mut bc, &meta, 2, 1000);

        let cmp = RecordComparator::ascending(&meta);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&b, &c), Ordering::Greater);
        assert_eq!(cmp.compare(&a, &c), Ordering::Less);
    }

    #[test]
    fn nulls_first_orders_null_before_any_value() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![true]);
        let mut ba = vec![0u8; meta.record_size()];
        let mut bb = vec![0u8; meta.record_size()];
        let mut a = RecordRef::new(&mut ba);
        a.set_null(meta.nullity_offset(0), true);
        let mut b = RecordRef::new(&mut bb);
        b.set_value::<i32>(meta.value_offset(0), -100);

        let cmp = RecordComparator::new(&meta, vec![FieldOrder { order: SortOrder::Ascending, nulls: NullsOrder::First }]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);

        let cmp_last = RecordComparator::new(&meta, vec![FieldOrder { order: SortOrder::Ascending, nulls: NullsOrder::Last }]);
        assert_eq!(cmp_last.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn descending_order_reverses_comparison() {
        let meta = meta_i4_i8();
        let mut ba = vec![0u8; meta.record_size()];
        let mut bb = vec![0u8; meta.record_size()];
        let a = rec(&mut ba, &meta, 1, 0);
        let b = rec(&mut bb, &meta, 2, 0);
        let cmp = RecordComparator::new(
            &meta,
            vec![
                FieldOrder { order: SortOrder::Descending, nulls: NullsOrder::First },
                FieldOrder::default(),
            ],
        );
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn decimal_compares_by_value_across_different_exponents() {
        let meta = RecordMeta::new(vec![FieldType::Decimal { precision: 10, scale: 2 }], vec![false]);
        let mut ba = vec![0u8; meta.record_size()];
        let mut bb = vec![0u8; meta.record_size()];
        let mut a = RecordRef::new(&mut ba);
        a.set_value(meta.value_offset(0), Decimal { sign: 1, hi: 0, lo: 100, exponent: -1 }); // 10.0
        let mut b = RecordRef::new(&mut bb);
        b.set_value(meta.value_offset(0), Decimal { sign: 1, hi: 0, lo: 1000, exponent: -2 }); // 10.00
        let cmp = RecordComparator::ascending(&meta);
        assert_eq!(cmp.compare(&a, &b), Ordering::Equal);
    }
}
