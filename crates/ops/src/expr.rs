//! Expression evaluation (§4.F), ported from jogasaki's
//! `executor::process::impl_::expression::evaluator` plus its
//! `evaluator_context`. Operates over decoded Rust values rather than raw
//! record bytes: a variable is decoded once into an [`EvalValue`], combined
//! through the expression tree, and the result is written back through
//! [`crate::conversion::convert_assignment`] by whichever operator owns the
//! target variable (project, write's encoded key/value, ...).

use sqlexec_record::{Decimal, FieldType};

use crate::context::OperatorContext;

/// A decoded scalar value in the domain expression evaluation computes in.
/// `Character` covers both CHARACTER and OCTET payloads (both are byte
/// sequences at this layer; the distinction only matters for comparison and
/// storage, handled by [`crate::variable_table`] and [`crate::conversion`]).
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Character(Vec<u8>),
}

impl EvalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EvalValue::Null)
    }

    /// `None` on a NULL or non-boolean value, mirroring how `filter` treats
    /// an unresolved predicate as "drop" rather than an error (§4.F).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EvalValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            EvalValue::Int(i) => Some(*i as f64),
            EvalValue::Float(f) => Some(*f),
            EvalValue::Decimal(d) => Some(decimal_to_f64(*d)),
            _ => None,
        }
    }
}

/// Best-effort decimal-to-double conversion used by the arithmetic fallback
/// path below. Always lossy for decimals whose magnitude doesn't fit a
/// `f64` mantissa exactly; callers arithmetic-ing a `Decimal` always set
/// [`EvalOutcome::lost_precision`].
pub(crate) fn decimal_to_f64(d: Decimal) -> f64 {
    let magnitude = (d.hi as f64) * 2f64.powi(64) + d.lo as f64;
    d.sign as f64 * magnitude * 10f64.powi(d.exponent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Whether a lost-precision/overflow condition during evaluation should be
/// surfaced as an error or merely recorded and allowed to continue.
/// Assignment conversion is implicit by default; `CAST` sets this to
/// `Explicit` around its own sub-evaluation (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossPrecisionPolicy {
    Implicit,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("integer overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("operand type mismatch")]
    TypeMismatch,
    #[error("unsupported expression")]
    Unsupported,
}

pub enum Expr {
    Literal(EvalValue),
    /// Reference to variable `index` in the variable table `blocks_up`
    /// levels above the current block (0 = current block).
    Variable { blocks_up: usize, index: usize },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cast { target: FieldType, expr: Box<Expr> },
}

/// Accumulated flags from the most recent arithmetic sub-evaluation,
/// mirroring the per-operation decimal-context flags the source records
/// (§4.F). `evaluate` resets these to `false` at entry and only ever sets
/// them, so a caller reads the worst case across the whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalFlags {
    pub lost_precision: bool,
    pub overflowed: bool,
}

pub fn evaluate(
    ctx: &mut OperatorContext,
    policy: LossPrecisionPolicy,
    expr: &Expr,
) -> Result<(EvalValue, EvalFlags), EvalError> {
    let mut flags = EvalFlags::default();
    let value = eval_inner(ctx, policy, expr, &mut flags)?;
    Ok((value, flags))
}

fn eval_inner(ctx: &mut OperatorContext, policy: LossPrecisionPolicy, expr: &Expr, flags: &mut EvalFlags) -> Result<EvalValue, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Variable { blocks_up, index } => {
            let (variables, scratch) = ctx.variables_and_scratch();
            let depth = variables.depth();
            let block_index = depth.checked_sub(1 + blocks_up).ok_or(EvalError::Unsupported)?;
            let table = variables.block(block_index);
            Ok(table.get_dynamic(*index, &*scratch))
        }
        Expr::Not(inner) => {
            let v = eval_inner(ctx, policy, inner, flags)?;
            match v {
                EvalValue::Null => Ok(EvalValue::Null),
                EvalValue::Boolean(b) => Ok(EvalValue::Boolean(!b)),
                _ => Err(EvalError::TypeMismatch),
            }
        }
        Expr::And(l, r) => {
            let lv = eval_inner(ctx, policy, l, flags)?;
            let rv = eval_inner(ctx, policy, r, flags)?;
            Ok(three_valued_and(&lv, &rv)?)
        }
        Expr::Or(l, r) => {
            let lv = eval_inner(ctx, policy, l, flags)?;
            let rv = eval_inner(ctx, policy, r, flags)?;
            Ok(three_valued_or(&lv, &rv)?)
        }
        Expr::Compare(op, l, r) => {
            let lv = eval_inner(ctx, policy, l, flags)?;
            let rv = eval_inner(ctx, policy, r, flags)?;
            if lv.is_null() || rv.is_null() {
                return Ok(EvalValue::Null);
            }
            Ok(EvalValue::Boolean(compare(*op, &lv, &rv)?))
        }
        Expr::Arith(op, l, r) => {
            let lv = eval_inner(ctx, policy, l, flags)?;
            let rv = eval_inner(ctx, policy, r, flags)?;
            if lv.is_null() || rv.is_null() {
                return Ok(EvalValue::Null);
            }
            arith(*op, &lv, &rv, policy, flags)
        }
        Expr::Cast { target, expr } => {
            let v = eval_inner(ctx, LossPrecisionPolicy::Explicit, expr, flags)?;
            cast(v, *target, flags)
        }
    }
}

fn three_valued_and(l: &EvalValue, r: &EvalValue) -> Result<EvalValue, EvalError> {
    match (l, r) {
        (EvalValue::Boolean(false), _) | (_, EvalValue::Boolean(false)) => Ok(EvalValue::Boolean(false)),
        (EvalValue::Null, _) | (_, EvalValue::Null) => Ok(EvalValue::Null),
        (EvalValue::Boolean(a), EvalValue::Boolean(b)) => Ok(EvalValue::Boolean(*a && *b)),
        _ => Err(EvalError::TypeMismatch),
    }
}

fn three_valued_or(l: &EvalValue, r: &EvalValue) -> Result<EvalValue, EvalError> {
    match (l, r) {
        (EvalValue::Boolean(true), _) | (_, EvalValue::Boolean(true)) => Ok(EvalValue::Boolean(true)),
        (EvalValue::Null, _) | (_, EvalValue::Null) => Ok(EvalValue::Null),
        (EvalValue::Boolean(a), EvalValue::Boolean(b)) => Ok(EvalValue::Boolean(*a || *b)),
        _ => Err(EvalError::TypeMismatch),
    }
}

fn compare(op: CompareOp, l: &EvalValue, r: &EvalValue) -> Result<bool, EvalError> {
    let ordering = match (l, r) {
        (EvalValue::Int(a), EvalValue::Int(b)) => a.cmp(b),
        (EvalValue::Character(a), EvalValue::Character(b)) => a.cmp(b),
        (EvalValue::Boolean(a), EvalValue::Boolean(b)) => a.cmp(b),
        _ => {
            let a = l.as_f64().ok_or(EvalError::TypeMismatch)?;
            let b = r.as_f64().ok_or(EvalError::TypeMismatch)?;
            a.total_cmp(&b)
        }
    };
    Ok(match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => !ordering.is_eq(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    })
}

fn arith(op: ArithOp, l: &EvalValue, r: &EvalValue, policy: LossPrecisionPolicy, flags: &mut EvalFlags) -> Result<EvalValue, EvalError> {
    // Decimal widens through f64: exact decimal arithmetic (scaled integer
    // math, matching `compare_decimal` in `sqlexec_record::comparator`)
    // is out of scope here; any decimal operand always records
    // `lost_precision`.
    if matches!(l, EvalValue::Decimal(_)) || matches!(r, EvalValue::Decimal(_)) {
        flags.lost_precision = true;
        let a = l.as_f64().ok_or(EvalError::TypeMismatch)?;
        let b = r.as_f64().ok_or(EvalError::TypeMismatch)?;
        return Ok(EvalValue::Float(apply_f64(op, a, b)?));
    }

    match (l, r) {
        (EvalValue::Int(a), EvalValue::Int(b)) => {
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => {
                    if *b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_div(*b)
                }
                ArithOp::Mod => {
                    if *b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_rem(*b)
                }
            };
            match result {
                Some(v) => Ok(EvalValue::Int(v)),
                None => {
                    flags.overflowed = true;
                    if policy == LossPrecisionPolicy::Explicit {
                        Err(EvalError::Overflow)
                    } else {
                        Ok(EvalValue::Int(apply_f64(op, *a as f64, *b as f64)? as i64))
                    }
                }
            }
        }
        _ => {
            let a = l.as_f64().ok_or(EvalError::TypeMismatch)?;
            let b = r.as_f64().ok_or(EvalError::TypeMismatch)?;
            Ok(EvalValue::Float(apply_f64(op, a, b)?))
        }
    }
}

fn apply_f64(op: ArithOp, a: f64, b: f64) -> Result<f64, EvalError> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        ArithOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
    })
}

fn cast(value: EvalValue, target: FieldType, flags: &mut EvalFlags) -> Result<EvalValue, EvalError> {
    if value.is_null() {
        return Ok(EvalValue::Null);
    }
    match target {
        FieldType::Boolean => value.as_bool().map(EvalValue::Boolean).ok_or(EvalError::TypeMismatch),
        FieldType::Int1 | FieldType::Int2 | FieldType::Int4 | FieldType::Int8 => match value {
            EvalValue::Int(i) => Ok(EvalValue::Int(i)),
            EvalValue::Float(f) => {
                flags.lost_precision = true;
                Ok(EvalValue::Int(f as i64))
            }
            EvalValue::Decimal(d) => {
                flags.lost_precision = true;
                Ok(EvalValue::Int(decimal_to_f64(d) as i64))
            }
            _ => Err(EvalError::TypeMismatch),
        },
        FieldType::Float4 | FieldType::Float8 => value.as_f64().map(EvalValue::Float).ok_or(EvalError::TypeMismatch),
        FieldType::Character { .. } | FieldType::Octet { .. } => match value {
            EvalValue::Character(bytes) => Ok(EvalValue::Character(bytes)),
            _ => Err(EvalError::Unsupported),
        },
        _ => Err(EvalError::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_arena::PagePool;
    use sqlexec_record::RecordMeta;
    use std::sync::Arc;

    fn ctx() -> OperatorContext {
        let root = VariableTable::new(RecordMeta::new(vec![FieldType::Int4, FieldType::Int4], vec![false, false]));
        OperatorContext::new(Arc::new(PagePool::new(4096)), root, None)
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        let mut ctx = ctx();
        let expr = Expr::Arith(ArithOp::Add, Box::new(Expr::Literal(EvalValue::Null)), Box::new(Expr::Literal(EvalValue::Int(1))));
        let (v, _) = evaluate(&mut ctx, LossPrecisionPolicy::Implicit, &expr).unwrap();
        assert_eq!(v, EvalValue::Null);
    }

    #[test]
    fn and_with_one_false_operand_is_false_even_if_other_is_null() {
        let l = EvalValue::Boolean(false);
        let r = EvalValue::Null;
        assert_eq!(three_valued_and(&l, &r).unwrap(), EvalValue::Boolean(false));
    }

    #[test]
    fn integer_overflow_under_explicit_policy_is_an_error() {
        let mut ctx = ctx();
        let expr = Expr::Arith(ArithOp::Add, Box::new(Expr::Literal(EvalValue::Int(i64::MAX))), Box::new(Expr::Literal(EvalValue::Int(1))));
        let result = eval_inner(&mut ctx, LossPrecisionPolicy::Explicit, &expr, &mut EvalFlags::default());
        assert_eq!(result, Err(EvalError::Overflow));
    }

    #[test]
    fn division_by_zero_is_always_an_error() {
        let mut ctx = ctx();
        let expr = Expr::Arith(ArithOp::Div, Box::new(Expr::Literal(EvalValue::Int(1))), Box::new(Expr::Literal(EvalValue::Int(0))));
        assert_eq!(evaluate(&mut ctx, LossPrecisionPolicy::Implicit, &expr), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn variable_reference_reads_current_block() {
        let mut ctx = ctx();
        ctx.variables().current().set::<i32>(0, 41);
        let expr = Expr::Arith(
            ArithOp::Add,
            Box::new(Expr::Variable { blocks_up: 0, index: 0 }),
            Box::new(Expr::Literal(EvalValue::Int(1))),
        );
        let (v, _) = evaluate(&mut ctx, LossPrecisionPolicy::Implicit, &expr).unwrap();
        assert_eq!(v, EvalValue::Int(42));
    }
}
