//! Emit operator (§4.F "emit", §4.B wire format): serializes the row bound
//! in the current variable table block through the tag-length stream
//! encoder and hands it to the result channel's writer. There is no
//! dedicated Boolean stream tag (§4.B), so a Boolean column is encoded as
//! `Int` 0/1.

use sqlexec_channel::RecordWriter;
use sqlexec_record::stream::Encoder;
use sqlexec_record::FieldType;

use crate::context::OperatorContext;
use crate::expr::EvalValue;
use crate::operator::{Operator, OperatorKind, OperatorResult};

#[derive(Debug, Clone, Copy)]
pub struct EmitColumn {
    pub variable_index: usize,
    pub field_type: FieldType,
}

pub struct EmitOperator {
    columns: Vec<EmitColumn>,
    writer: Box<dyn RecordWriter>,
}

impl EmitOperator {
    pub fn new(columns: Vec<EmitColumn>, writer: Box<dyn RecordWriter>) -> Self {
        Self { columns, writer }
    }
}

impl Operator for EmitOperator {
    fn open(&mut self, _ctx: &mut OperatorContext) {}

    fn process_row(&mut self, ctx: &mut OperatorContext) -> OperatorResult {
        let mut enc = Encoder::new();
        enc.row(self.columns.len() as u64);
        {
            let (variables, scratch) = ctx.variables_and_scratch();
            let table = variables.current();
            for column in &self.columns {
                match table.get_dynamic(column.variable_index, &*scratch) {
                    EvalValue::Null => {
                        enc.null();
                    }
                    EvalValue::Boolean(b) => {
                        enc.int(b as i64);
                    }
                    EvalValue::Int(i) => {
                        enc.int(i);
                    }
                    EvalValue::Float(f) => match column.field_type {
                        FieldType::Float4 => {
                            enc.float4(f as f32);
                        }
                        _ => {
                            enc.float8(f);
                        }
                    },
                    EvalValue::Decimal(d) => {
                        enc.decimal(d);
                    }
                    EvalValue::Character(bytes) => match column.field_type {
                        FieldType::Octet { .. } => {
                            enc.octet(&bytes);
                        }
                        _ => {
                            enc.character(&bytes);
                        }
                    },
                };
            }
        }
        if let Err(info) = self.writer.write_row(&enc.into_bytes()) {
            ctx.report_error(info);
        }
        OperatorResult::HasMore
    }

    fn close(&mut self, ctx: &mut OperatorContext) {
        if let Err(info) = self.writer.commit() {
            ctx.report_error(info);
        }
    }
}
