//! Variable table (§4.F), ported from jogasaki's `executor::process::impl_::variable_table`:
//! a block-scoped slot table holding intermediate values (host variables,
//! column projections, join-build accumulators) addressed by a small integer
//! index rather than by name — name resolution happens once, ahead of time,
//! when a plan is compiled.
//!
//! Backed by the same [`sqlexec_record::RecordMeta`]/[`RecordRef`] machinery
//! as a stored record, so reading/writing a variable is exactly reading or
//! writing a record field: no separate value representation to keep in sync.

use sqlexec_arena::{ArenaAlloc, ArenaResolve};
use sqlexec_record::{Decimal, FieldCodec, FieldType, RecordMeta, RecordRef, VarlenValue};

use crate::expr::EvalValue;

/// One block's variable slots: a plain record whose fields are addressed by
/// variable index instead of by a stored position in a container.
pub struct VariableTable {
    meta: RecordMeta,
    buffer: Vec<u8>,
}

impl VariableTable {
    pub fn new(meta: RecordMeta) -> Self {
        let size = meta.record_size();
        Self { meta, buffer: vec![0u8; size] }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn record(&mut self) -> RecordRef<'_> {
        RecordRef::new(&mut self.buffer)
    }

    /// `None` if variable `index` is currently NULL (or unconditionally
    /// `Some` if it is not nullable per its declared type).
    pub fn get<T: FieldCodec>(&self, index: usize) -> Option<T> {
        if self.meta.is_nullable(index) {
            let bit = self.meta.nullity_offset(index);
            let byte = bit / 8;
            if (self.buffer[byte] >> (bit % 8)) & 1 != 0 {
                return None;
            }
        }
        let offset = self.meta.value_offset(index);
        Some(T::decode(&self.buffer[offset..offset + T::WIDTH]))
    }

    pub fn set<T: FieldCodec>(&mut self, index: usize, value: T) {
        let value_offset = self.meta.value_offset(index);
        let nullable = self.meta.is_nullable(index);
        let nullity_offset = if nullable { Some(self.meta.nullity_offset(index)) } else { None };
        let mut record = self.record();
        if let Some(bit) = nullity_offset {
            record.set_null(bit, false);
        }
        record.set_value(value_offset, value);
    }

    pub fn set_null(&mut self, index: usize) {
        let bit = self.meta.nullity_offset(index);
        self.record().set_null(bit, true);
    }

    /// Type-erased read used by expression evaluation, which works over
    /// [`EvalValue`] rather than a statically-known `T: FieldCodec`.
    /// `Pointer`-typed fields never appear as expression operands (§4.B is
    /// an internal-only field kind) and panic here if attempted.
    pub fn get_dynamic(&self, index: usize, resolver: &dyn ArenaResolve) -> EvalValue {
        if self.meta.is_nullable(index) {
            let bit = self.meta.nullity_offset(index);
            if (self.buffer[bit / 8] >> (bit % 8)) & 1 != 0 {
                return EvalValue::Null;
            }
        }
        let offset = self.meta.value_offset(index);
        match self.meta.field_type(index) {
            FieldType::Boolean => EvalValue::Boolean(self.buffer[offset] != 0),
            FieldType::Int1 => EvalValue::Int(i8::decode(&self.buffer[offset..offset + 1]) as i64),
            FieldType::Int2 => EvalValue::Int(i16::decode(&self.buffer[offset..offset + 2]) as i64),
            FieldType::Int4 => EvalValue::Int(i32::decode(&self.buffer[offset..offset + 4]) as i64),
            FieldType::Int8 => EvalValue::Int(i64::decode(&self.buffer[offset..offset + 8])),
            FieldType::Float4 => EvalValue::Float(f32::decode(&self.buffer[offset..offset + 4]) as f64),
            FieldType::Float8 => EvalValue::Float(f64::decode(&self.buffer[offset..offset + 8])),
            FieldType::Decimal { .. } => EvalValue::Decimal(Decimal::decode(&self.buffer[offset..offset + Decimal::WIDTH])),
            FieldType::Character { .. } | FieldType::Octet { .. } => {
                let varlen = VarlenValue::decode(&self.buffer[offset..offset + 16]);
                EvalValue::Character(varlen.bytes(resolver).to_vec())
            }
            other => panic!("variable {index} has no expression-evaluable representation: {other:?}"),
        }
    }

    /// Inverse of [`VariableTable::get_dynamic`]; writes through a varlen
    /// arena for CHARACTER/OCTET payloads longer than the inline capacity.
    pub fn set_dynamic(&mut self, index: usize, value: &EvalValue, arena: &mut dyn ArenaAlloc) {
        if self.meta.is_nullable(index) {
            let bit = self.meta.nullity_offset(index);
            let is_null = matches!(value, EvalValue::Null);
            let byte = bit / 8;
            if is_null {
                self.buffer[byte] |= 1 << (bit % 8);
                return;
            }
            self.buffer[byte] &= !(1 << (bit % 8));
        }
        let offset = self.meta.value_offset(index);
        match (self.meta.field_type(index), value) {
            (FieldType::Boolean, EvalValue::Boolean(b)) => self.buffer[offset] = u8::from(*b),
            (FieldType::Int1, EvalValue::Int(i)) => (*i as i8).encode(&mut self.buffer[offset..offset + 1]),
            (FieldType::Int2, EvalValue::Int(i)) => (*i as i16).encode(&mut self.buffer[offset..offset + 2]),
            (FieldType::Int4, EvalValue::Int(i)) => (*i as i32).encode(&mut self.buffer[offset..offset + 4]),
            (FieldType::Int8, EvalValue::Int(i)) => i.encode(&mut self.buffer[offset..offset + 8]),
            (FieldType::Float4, EvalValue::Float(f)) => (*f as f32).encode(&mut self.buffer[offset..offset + 4]),
            (FieldType::Float8, EvalValue::Float(f)) => f.encode(&mut self.buffer[offset..offset + 8]),
            (FieldType::Decimal { .. }, EvalValue::Decimal(d)) => d.encode(&mut self.buffer[offset..offset + Decimal::WIDTH]),
            (FieldType::Character { .. } | FieldType::Octet { .. }, EvalValue::Character(bytes)) => {
                let varlen = VarlenValue::store(bytes, arena);
                varlen.encode(&mut self.buffer[offset..offset + 16]);
            }
            (field_type, _) => panic!("value does not match variable {index}'s declared type {field_type:?}"),
        }
    }
}

/// Nested block scopes: `push`/`pop` mirror entering/leaving a nested
/// `process` step's block (a join's build side, a subquery, a CASE branch),
/// each with its own [`VariableTable`]. Index 0 is the outermost block and
/// is never popped.
#[derive(Default)]
pub struct VariableTableStack {
    blocks: Vec<VariableTable>,
}

impl VariableTableStack {
    pub fn new(root: VariableTable) -> Self {
        Self { blocks: vec![root] }
    }

    pub fn push(&mut self, table: VariableTable) {
        self.blocks.push(table);
    }

    /// Pops the innermost block. Panics if called with only the root block
    /// remaining — popping past the root is a construction bug in whichever
    /// operator mismatched its enter/exit pairing.
    pub fn pop(&mut self) {
        assert!(self.blocks.len() > 1, "cannot pop the root variable table block");
        self.blocks.pop();
    }

    pub fn current(&mut self) -> &mut VariableTable {
        self.blocks.last_mut().expect("variable table stack is never empty")
    }

    /// Block at `block_index` counting from the root (0-based), matching
    /// how a compiled plan refers to an enclosing block's variable by its
    /// static nesting depth.
    pub fn block(&mut self, block_index: usize) -> &mut VariableTable {
        &mut self.blocks[block_index]
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_record::FieldType;

    #[test]
    fn nested_block_reads_and_writes_independently_of_root() {
        let root_meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        let mut stack = VariableTableStack::new(VariableTable::new(root_meta));
        stack.block(0).set::<i32>(0, 10);

        let nested_meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        stack.push(VariableTable::new(nested_meta));
        stack.current().set::<i32>(0, 20);

        assert_eq!(stack.current().get::<i32>(0), Some(20));
        assert_eq!(stack.block(0).get::<i32>(0), Some(10));

        stack.pop();
        assert_eq!(stack.current().get::<i32>(0), Some(10));
    }

    #[test]
    fn nullable_variable_round_trips_through_null_and_back() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![true]);
        let mut table = VariableTable::new(meta);
        assert_eq!(table.get::<i32>(0), Some(0));
        table.set_null(0);
        assert_eq!(table.get::<i32>(0), None);
        table.set::<i32>(0, 7);
        assert_eq!(table.get::<i32>(0), Some(7));
    }

    #[test]
    #[should_panic(expected = "cannot pop the root")]
    fn popping_root_block_panics() {
        let meta = RecordMeta::new(vec![FieldType::Int4], vec![false]);
        let mut stack = VariableTableStack::new(VariableTable::new(meta));
        stack.pop();
    }
}
