//! Project operator (§4.F "project"): evaluates a list of expressions and
//! writes each result, through assignment conversion, into a named variable
//! of the current block — the shape a `SELECT` column list or a join's
//! build-side key extraction compiles down to.

use sqlexec_channel::{ErrorCode, ErrorInfo};
use sqlexec_record::FieldType;

use crate::context::OperatorContext;
use crate::conversion::convert_assignment;
use crate::expr::{evaluate, Expr, LossPrecisionPolicy};
use crate::operator::{Operator, OperatorKind, OperatorResult};

/// One projected column: the expression to evaluate, the type it naturally
/// produces, and the variable (with its declared type) it is assigned into.
pub struct Projection {
    pub expr: Expr,
    pub source_type: FieldType,
    pub target_variable: usize,
    pub target_type: FieldType,
}

pub struct ProjectOperator {
    projections: Vec<Projection>,
    downstream: Option<Box<OperatorKind>>,
}

impl ProjectOperator {
    pub fn new(projections: Vec<Projection>, downstream: Option<Box<OperatorKind>>) -> Self {
        Self { projections, downstream }
    }
}

impl Operator for ProjectOperator {
    fn open(&mut self, ctx: &mut OperatorContext) {
        if let Some(downstream) = &mut self.downstream {
            downstream.open(ctx);
        }
    }

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        // No local scratch checkpoint here: a projected CHARACTER/OCTET
        // value may be written out-of-line into scratch by `set_dynamic`
        // below, and that allocation must stay live for the downstream
        // operators this call drives. Scratch is reclaimed once per row by
        // the pipeline's source operator, after the whole row has flowed
        // through to its sink.
        for projection in &self.projections {
            let evaluated = evaluate(ctx, LossPrecisionPolicy::Implicit, &projection.expr)
                .map_err(|err| ErrorInfo::new(ErrorCode::EvaluationException, err.to_string()))
                .and_then(|(value, _)| {
                    convert_assignment(value, projection.source_type, projection.target_type).map_err(|err| err.into_error_info())
                });
            match evaluated {
                Ok(converted) => {
                    let (variables, scratch) = ctx.variables_and_scratch();
                    variables.current().set_dynamic(projection.target_variable, &converted, scratch);
                }
                Err(info) => {
                    ctx.report_error(info);
                    break;
                }
            }
        }
        if !ctx.has_error() {
            if let Some(downstream) = &mut self.downstream {
                downstream.process_row(ctx);
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
