//! Operator runtime (§4.F): variable tables, expression evaluation, and the
//! scan/filter/project/join/aggregate/emit/write operator kinds that a
//! compiled plan's step graph instantiates, ported from jogasaki's
//! `executor::process::impl_::ops` family.

pub mod context;
pub mod conversion;
pub mod expr;
pub mod operator;
pub mod operators;
pub mod variable_table;

pub use context::OperatorContext;
pub use conversion::{convert_assignment, ConversionAction, ConversionError};
pub use expr::{evaluate, EvalError, EvalValue, Expr};
pub use operator::{Operator, OperatorKind, OperatorResult};
pub use variable_table::{VariableTable, VariableTableStack};
