//! Operator execution context (§4.F), ported from jogasaki's
//! `executor::process::impl_::ops::context_base` plus the
//! `request_context`/`task_context` pieces every operator reaches into:
//! scratch memory for expression evaluation, the block-scoped variable
//! table stack, and the transaction an operator's reads/writes belong to.

use std::sync::Arc;

use sqlexec_arena::{LifoArena, LifoCheckpoint, PagePool};
use sqlexec_channel::{ErrorInfo, ErrorSlot};
use sqlexec_txn::TransactionContext;

use crate::variable_table::{VariableTable, VariableTableStack};

/// Everything one operator invocation needs besides its own private state:
/// a scratch arena for transient allocations (varlen intermediates produced
/// by expression evaluation), the variable table stack for the current
/// block nesting, and the transaction whose error slot absorbs failures.
///
/// Not `Sync`: one `OperatorContext` belongs to exactly one task at a time,
/// matching how the scheduler hands a task exclusive use of its step.
pub struct OperatorContext {
    scratch: LifoArena,
    variables: VariableTableStack,
    transaction: Option<Arc<TransactionContext>>,
    local_errors: ErrorSlot,
}

impl OperatorContext {
    pub fn new(scratch_pool: Arc<PagePool>, root_variables: VariableTable, transaction: Option<Arc<TransactionContext>>) -> Self {
        Self {
            scratch: LifoArena::new(scratch_pool),
            variables: VariableTableStack::new(root_variables),
            transaction,
            local_errors: ErrorSlot::new(),
        }
    }

    pub fn scratch(&mut self) -> &mut LifoArena {
        &mut self.scratch
    }

    pub fn variables(&mut self) -> &mut VariableTableStack {
        &mut self.variables
    }

    /// Split borrow of the two fields expression evaluation needs at once:
    /// the variable table (to read a variable) and the scratch arena (to
    /// resolve that variable's out-of-line varlen payload, if any). Two
    /// disjoint `&mut` fields of the same struct, not two overlapping
    /// borrows of `self`, so this needs no `unsafe`.
    pub fn variables_and_scratch(&mut self) -> (&mut VariableTableStack, &mut LifoArena) {
        (&mut self.variables, &mut self.scratch)
    }

    pub fn transaction(&self) -> Option<&Arc<TransactionContext>> {
        self.transaction.as_ref()
    }

    /// Scratch lifetime for one row's worth of expression evaluation:
    /// callers checkpoint before processing a row and rewind after, so
    /// intermediate varlen values never accumulate across rows.
    pub fn checkpoint_scratch(&self) -> LifoCheckpoint {
        self.scratch.checkpoint()
    }

    pub fn rewind_scratch(&mut self, checkpoint: LifoCheckpoint) {
        self.scratch.rewind(checkpoint);
    }

    /// First-writer-wins (§3/§8 invariant 8), routed to the owning
    /// transaction's slot when one exists so every operator sharing the
    /// transaction observes the same terminal error; falls back to a
    /// context-local slot for operators running outside a transaction
    /// (e.g. a `describe` request, S8).
    pub fn report_error(&self, info: ErrorInfo) -> bool {
        match &self.transaction {
            Some(txn) => txn.set_error(info),
            None => self.local_errors.set(info),
        }
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        match &self.transaction {
            Some(txn) => txn.error_slot().get(),
            None => self.local_errors.get(),
        }
    }

    pub fn has_error(&self) -> bool {
        match &self.transaction {
            Some(txn) => txn.error_slot().is_set(),
            None => self.local_errors.is_set(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlexec_channel::ErrorCode;
    use sqlexec_record::{FieldType, RecordMeta};
    use sqlexec_storage::{TransactionHandle, TransactionMode};

    fn context() -> OperatorContext {
        let root = VariableTable::new(RecordMeta::new(vec![FieldType::Int4], vec![false]));
        OperatorContext::new(Arc::new(PagePool::new(4096)), root, None)
    }

    #[test]
    fn scratch_checkpoint_rewind_reuses_allocation() {
        let mut ctx = context();
        let cp = ctx.checkpoint_scratch();
        let a = ctx.scratch().allocate(16, 8);
        ctx.rewind_scratch(cp);
        let b = ctx.scratch().allocate(16, 8);
        assert_eq!(a, b);
    }

    #[test]
    fn report_error_without_transaction_uses_local_slot() {
        let ctx = context();
        assert!(!ctx.has_error());
        assert!(ctx.report_error(ErrorInfo::new(ErrorCode::InternalException, "boom")));
        assert!(ctx.has_error());
        assert!(!ctx.report_error(ErrorInfo::new(ErrorCode::CcException, "second")));
        assert_eq!(ctx.error().unwrap().code, ErrorCode::InternalException);
    }

    #[test]
    fn report_error_with_transaction_goes_to_shared_slot() {
        let txn = Arc::new(TransactionContext::new(1, TransactionHandle(1), TransactionMode::Occ));
        let root = VariableTable::new(RecordMeta::new(vec![FieldType::Int4], vec![false]));
        let ctx = OperatorContext::new(Arc::new(PagePool::new(4096)), root, Some(Arc::clone(&txn)));
        ctx.report_error(ErrorInfo::new(ErrorCode::ValueEvaluationException, "bad value"));
        assert_eq!(txn.error_slot().get().unwrap().code, ErrorCode::ValueEvaluationException);
    }
}
