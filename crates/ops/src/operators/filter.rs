//! Filter operator (§4.F "filter"): evaluates a boolean predicate against
//! the variables bound by an upstream operator and forwards the row
//! downstream only when it evaluates true. A NULL predicate drops the row
//! silently, matching standard three-valued `WHERE` semantics — it is never
//! treated as an error.

use sqlexec_channel::{ErrorCode, ErrorInfo};

use crate::context::OperatorContext;
use crate::expr::{evaluate, EvalValue, Expr, LossPrecisionPolicy};
use crate::operator::{Operator, OperatorKind, OperatorResult};

pub struct FilterOperator {
    predicate: Expr,
    downstream: Option<Box<OperatorKind>>,
}

impl FilterOperator {
    pub fn new(predicate: Expr, downstream: Option<Box<OperatorKind>>) -> Self {
        Self { predicate, downstream }
    }
}

impl Operator for FilterOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        let result = evaluate(ctx, LossPrecisionPolicy::Implicit, &self.predicate);
        match result {
            Ok((EvalValue::Boolean(true), _)) => {
                if let Some(downstream) = &mut self.downstream {
                    downstream.process_row(ctx);
                }
            }
            Ok(_) => {}
            Err(err) => {
                ctx.report_error(ErrorInfo::new(ErrorCode::EvaluationException, err.to_string()));
            }
        }
        OperatorResult::HasMore
    }

    fn close(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.close(ctx);
        }
    }
}
