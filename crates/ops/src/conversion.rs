//! Assignment conversion (§4.F), ported from jogasaki's
//! `executor::process::impl_::expression::details::cast_evaluation` plus the
//! type-compatibility table its `assign` path consults. Maps a `(source,
//! target)` field type pair to a [`ConversionAction`], then performs it.

use sqlexec_channel::{ErrorCode, ErrorInfo};
use sqlexec_record::FieldType;

use crate::expr::EvalValue;

/// What an assignment from `source` to `target` requires, decided once per
/// `(source, target)` pair so callers don't re-derive it per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionAction {
    /// Identical representation, or same family differing only in a
    /// parameter that carries no information once both sides are zero (e.g.
    /// `TIME` vs `TIME WITH TIME ZONE` at a zero offset): copy through.
    NoOp,
    /// Numeric promotion/demotion; may fail at conversion time if the value
    /// doesn't fit the target's range.
    Numeric,
    /// CHARACTER/OCTET to CHARACTER/OCTET; may fail if the payload exceeds
    /// the target's declared length.
    Character { max_length: Option<u32> },
    /// No rule exists for this pair.
    Unsupported,
}

pub fn classify(source: FieldType, target: FieldType) -> ConversionAction {
    use FieldType::*;
    match (source, target) {
        (a, b) if a == b => ConversionAction::NoOp,
        (TimeOfDay { .. }, TimeOfDay { .. }) | (TimePoint { .. }, TimePoint { .. }) => ConversionAction::NoOp,
        (Boolean, Boolean)
        | (Int1 | Int2 | Int4 | Int8, Int1 | Int2 | Int4 | Int8)
        | (Float4 | Float8, Float4 | Float8)
        | (Int1 | Int2 | Int4 | Int8, Float4 | Float8)
        | (Float4 | Float8, Int1 | Int2 | Int4 | Int8)
        | (Decimal { .. }, Int1 | Int2 | Int4 | Int8 | Float4 | Float8 | Decimal { .. })
        | (Int1 | Int2 | Int4 | Int8 | Float4 | Float8, Decimal { .. }) => ConversionAction::Numeric,
        (Character { .. } | Octet { .. }, Character { length, .. } | Octet { length, .. }) => {
            ConversionAction::Character { max_length: length }
        }
        _ => ConversionAction::Unsupported,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// The source value's length exceeds the target CHARACTER/OCTET's
    /// declared length.
    #[error("value too long for target length")]
    ValueTooLong,
    #[error("value does not fit the target type's range")]
    ValueEvaluation,
    #[error("unsupported conversion from {source:?} to {target:?}")]
    UnsupportedRuntimeFeature { source: FieldType, target: FieldType },
}

impl ConversionError {
    /// §7 error mapping. Truncation of a CHARACTER/OCTET value beyond the
    /// target's declared length is its own outcome, `ValueTooLongException`
    /// (§4.F), distinct from a numeric range overflow.
    pub fn into_error_info(self) -> ErrorInfo {
        match self {
            ConversionError::ValueTooLong => {
                ErrorInfo::new(ErrorCode::ValueTooLongException, "value too long for the target column")
            }
            ConversionError::ValueEvaluation => {
                ErrorInfo::new(ErrorCode::ValueEvaluationException, "value does not fit the target type")
            }
            ConversionError::UnsupportedRuntimeFeature { source, target } => ErrorInfo::new(
                ErrorCode::UnsupportedRuntimeFeatureException,
                format!("no assignment conversion from {source:?} to {target:?}"),
            ),
        }
    }
}

/// Performs the conversion classified by [`classify`]. NULL always converts
/// to NULL regardless of action.
pub fn convert_assignment(value: EvalValue, source: FieldType, target: FieldType) -> Result<EvalValue, ConversionError> {
    if value.is_null() {
        return Ok(EvalValue::Null);
    }
    match classify(source, target) {
        ConversionAction::NoOp => Ok(value),
        ConversionAction::Numeric => convert_numeric(value, target),
        ConversionAction::Character { max_length } => convert_character(value, max_length),
        ConversionAction::Unsupported => Err(ConversionError::UnsupportedRuntimeFeature { source, target }),
    }
}

fn convert_numeric(value: EvalValue, target: FieldType) -> Result<EvalValue, ConversionError> {
    match (target, value) {
        (FieldType::Int1, EvalValue::Int(i)) => fits(i, i8::MIN as i64, i8::MAX as i64).map(EvalValue::Int),
        (FieldType::Int2, EvalValue::Int(i)) => fits(i, i16::MIN as i64, i16::MAX as i64).map(EvalValue::Int),
        (FieldType::Int4, EvalValue::Int(i)) => fits(i, i32::MIN as i64, i32::MAX as i64).map(EvalValue::Int),
        (FieldType::Int8, EvalValue::Int(i)) => Ok(EvalValue::Int(i)),
        (FieldType::Int1 | FieldType::Int2 | FieldType::Int4 | FieldType::Int8, EvalValue::Float(f)) => {
            if f.is_finite() { Ok(EvalValue::Int(f as i64)) } else { Err(ConversionError::ValueEvaluation) }
        }
        (FieldType::Float4 | FieldType::Float8, EvalValue::Int(i)) => Ok(EvalValue::Float(i as f64)),
        (FieldType::Float4 | FieldType::Float8, EvalValue::Float(f)) => Ok(EvalValue::Float(f)),
        (FieldType::Decimal { .. }, v) => Ok(v),
        (FieldType::Int1 | FieldType::Int2 | FieldType::Int4 | FieldType::Int8, EvalValue::Decimal(d)) => {
            let f = crate::expr::decimal_to_f64(d);
            if f.is_finite() { Ok(EvalValue::Int(f as i64)) } else { Err(ConversionError::ValueEvaluation) }
        }
        (FieldType::Float4 | FieldType::Float8, EvalValue::Decimal(d)) => Ok(EvalValue::Float(crate::expr::decimal_to_f64(d))),
        _ => Err(ConversionError::ValueEvaluation),
    }
}

fn fits(i: i64, min: i64, max: i64) -> Result<i64, ConversionError> {
    if i >= min && i <= max {
        Ok(i)
    } else {
        Err(ConversionError::ValueEvaluation)
    }
}

fn convert_character(value: EvalValue, max_length: Option<u32>) -> Result<EvalValue, ConversionError> {
    match value {
        EvalValue::Character(bytes) => {
            if let Some(max) = max_length {
                if bytes.len() > max as usize {
                    return Err(ConversionError::ValueTooLong);
                }
            }
            Ok(EvalValue::Character(bytes))
        }
        _ => Err(ConversionError::ValueEvaluation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_are_a_no_op() {
        assert_eq!(classify(FieldType::Int4, FieldType::Int4), ConversionAction::NoOp);
    }

    #[test]
    fn time_with_and_without_zone_is_a_no_op() {
        assert_eq!(
            classify(FieldType::TimeOfDay { with_offset: false }, FieldType::TimeOfDay { with_offset: true }),
            ConversionAction::NoOp
        );
    }

    #[test]
    fn narrowing_overflow_is_value_evaluation_error() {
        let err = convert_assignment(EvalValue::Int(1000), FieldType::Int4, FieldType::Int1).unwrap_err();
        assert_eq!(err, ConversionError::ValueEvaluation);
    }

    #[test]
    fn character_longer_than_target_is_too_long() {
        let err = convert_assignment(
            EvalValue::Character(vec![0u8; 10]),
            FieldType::Character { varying: true, length: Some(20) },
            FieldType::Character { varying: true, length: Some(5) },
        )
        .unwrap_err();
        assert_eq!(err, ConversionError::ValueTooLong);
        assert_eq!(err.into_error_info().code, sqlexec_channel::ErrorCode::ValueTooLongException);
    }

    #[test]
    fn unknown_pair_is_unsupported_runtime_feature() {
        let err = convert_assignment(EvalValue::Boolean(true), FieldType::Boolean, FieldType::Date).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedRuntimeFeature { .. }));
    }

    #[test]
    fn null_converts_to_null_regardless_of_action() {
        assert_eq!(convert_assignment(EvalValue::Null, FieldType::Int4, FieldType::Date).unwrap(), EvalValue::Null);
    }
}
