//! The storage interface contract (§6): `open_transaction` / `put` / `get` /
//! `scan` / `commit` / `abort`, consumed (not implemented) by the engine in
//! production; this crate's [`crate::memory::InMemoryStorage`] is the only
//! implementation, used by tests.

use crate::mode::{TransactionMode, TransactionOptions};
use crate::scan::ScanRange;
use crate::status::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Upsert,
    Update,
    Delete,
}

/// Durability marker reported asynchronously by `commit` (§4.H): the point
/// at which a commit has been made durable by the underlying log.
pub type DurabilityMarker = u64;

pub trait Storage: Send + Sync {
    fn open_transaction(&self, mode: TransactionMode, options: TransactionOptions) -> Result<TransactionHandle, StatusCode>;

    fn put(&self, tx: TransactionHandle, storage: &str, key: &[u8], value: &[u8], kind: WriteKind) -> StatusCode;

    /// `Ok(None)` corresponds to `status::not_found` (a warning, not an
    /// error, §7): callers decide what that means for their operator.
    fn get(&self, tx: TransactionHandle, storage: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StatusCode>;

    fn scan(&self, tx: TransactionHandle, storage: &str, range: &ScanRange) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>, StatusCode>;

    /// Asynchronously durable: `callback` is invoked with the assigned
    /// durability marker once the underlying store reports durability. The
    /// reference implementation invokes it inline (there is no real log),
    /// but callers must not assume synchronous invocation.
    fn commit(&self, tx: TransactionHandle, callback: Box<dyn FnOnce(DurabilityMarker) + Send>) -> StatusCode;

    fn abort(&self, tx: TransactionHandle) -> StatusCode;
}
