//! In-memory reference implementation of [`Storage`] (§6), used by the
//! engine's own tests to exercise the S1-S4 scenarios without a real KV
//! store. Implements enough occ conflict detection to make S3 ("conflicting
//! long transactions") meaningful: every key carries a monotonically
//! increasing version, and an occ transaction's commit fails with
//! `ErrSerializationFailure` if any key it read has moved since its
//! snapshot was taken.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::mode::{TransactionMode, TransactionOptions};
use crate::scan::ScanRange;
use crate::status::StatusCode;
use crate::storage_trait::{DurabilityMarker, Storage, TransactionHandle, WriteKind};

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    version: u64,
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<Vec<u8>, Entry>,
}

struct TxnState {
    mode: TransactionMode,
    options: TransactionOptions,
    snapshot_version: u64,
    reads: Vec<(String, Vec<u8>, u64)>,
    writes: Vec<(String, Vec<u8>, Option<Vec<u8>>, WriteKind)>,
    active: bool,
}

#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<std::collections::HashMap<String, Table>>,
    txns: Mutex<std::collections::HashMap<u64, TxnState>>,
    next_tx_id: AtomicU64,
    version_clock: AtomicU64,
    durability_clock: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(&self) -> u64 {
        self.version_clock.load(Ordering::SeqCst)
    }
}

impl Storage for InMemoryStorage {
    fn open_transaction(&self, mode: TransactionMode, options: TransactionOptions) -> Result<TransactionHandle, StatusCode> {
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        self.txns.lock().insert(
            id,
            TxnState { mode, options, snapshot_version: self.current_version(), reads: Vec::new(), writes: Vec::new(), active: true },
        );
        Ok(TransactionHandle(id))
    }

    fn put(&self, tx: TransactionHandle, storage: &str, key: &[u8], value: &[u8], kind: WriteKind) -> StatusCode {
        let mut txns = self.txns.lock();
        let Some(state) = txns.get_mut(&tx.0) else { return StatusCode::ErrInactiveTransaction };
        if !state.active {
            return StatusCode::ErrInactiveTransaction;
        }
        if state.mode == TransactionMode::Rtx {
            return StatusCode::ErrWriteOperationByRtx;
        }
        if state.mode == TransactionMode::Ltx && !state.options.write_preserve.iter().any(|s| s == storage) {
            return StatusCode::ErrWriteWithoutWritePreserve;
        }
        if key.is_empty() {
            return StatusCode::ErrInvalidKeyLength;
        }
        // Buffer the write; applied to the table at commit time so aborted
        // transactions never leave a trace.
        let existing = self.tables.lock().get(storage).and_then(|t| t.rows.get(key)).cloned();
        match kind {
            WriteKind::Insert if existing.is_some() => return StatusCode::AlreadyExists,
            WriteKind::Update if existing.is_none() => return StatusCode::NotFound,
            _ => {}
        }
        state.writes.push((storage.to_string(), key.to_vec(), if kind == WriteKind::Delete { None } else { Some(value.to_vec()) }, kind));
        StatusCode::Ok
    }

    fn get(&self, tx: TransactionHandle, storage: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StatusCode> {
        let mut txns = self.txns.lock();
        let Some(state) = txns.get_mut(&tx.0) else { return Err(StatusCode::ErrInactiveTransaction) };
        if !state.active {
            return Err(StatusCode::ErrInactiveTransaction);
        }
        let tables = self.tables.lock();
        let entry = tables.get(storage).and_then(|t| t.rows.get(key));
        let version = entry.map(|e| e.version).unwrap_or(0);
        state.reads.push((storage.to_string(), key.to_vec(), version));
        Ok(entry.map(|e| e.value.clone()))
    }

    fn scan(&self, tx: TransactionHandle, storage: &str, range: &ScanRange) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>, StatusCode> {
        let mut txns = self.txns.lock();
        let Some(state) = txns.get_mut(&tx.0) else { return Err(StatusCode::ErrInactiveTransaction) };
        if !state.active {
            return Err(StatusCode::ErrInactiveTransaction);
        }
        let tables = self.tables.lock();
        let mut out = Vec::new();
        if let Some(table) = tables.get(storage) {
            for (k, entry) in &table.rows {
                if range.contains(k) {
                    state.reads.push((storage.to_string(), k.clone(), entry.version));
                    out.push((k.clone(), entry.value.clone()));
                }
            }
        }
        Ok(Box::new(out.into_iter()))
    }

    fn commit(&self, tx: TransactionHandle, callback: Box<dyn FnOnce(DurabilityMarker) + Send>) -> StatusCode {
        let mut txns = self.txns.lock();
        let Some(state) = txns.remove(&tx.0) else { return StatusCode::ErrInactiveTransaction };
        if !state.active {
            return StatusCode::ErrInactiveTransaction;
        }
        if state.mode != TransactionMode::Rtx {
            let tables = self.tables.lock();
            for (storage, key, seen_version) in &state.reads {
                let current = tables.get(storage).and_then(|t| t.rows.get(key)).map(|e| e.version).unwrap_or(0);
                if current != *seen_version {
                    log::warn!("commit conflict on {storage}/{}: seen v{seen_version}, now v{current}", sqlexec_helpers::hex(key));
                    return StatusCode::ErrSerializationFailure;
                }
            }
        }

        let mut tables = self.tables.lock();
        for (storage, key, value, kind) in &state.writes {
            let table = tables.entry(storage.clone()).or_default();
            let version = self.version_clock.fetch_add(1, Ordering::SeqCst) + 1;
            match kind {
                WriteKind::Delete => {
                    table.rows.remove(key);
                }
                _ => {
                    table.rows.insert(key.clone(), Entry { value: value.clone().unwrap_or_default(), version });
                }
            }
        }
        drop(tables);

        let marker = self.durability_clock.fetch_add(1, Ordering::SeqCst) + 1;
        callback(marker);
        StatusCode::Ok
    }

    fn abort(&self, tx: TransactionHandle) -> StatusCode {
        match self.txns.lock().remove(&tx.0) {
            Some(_) => StatusCode::Ok,
            None => StatusCode::ErrInactiveTransaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(storage: &InMemoryStorage) -> TransactionHandle {
        storage.open_transaction(TransactionMode::Occ, TransactionOptions::default()).unwrap()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let s = InMemoryStorage::new();
        let tx = occ(&s);
        assert_eq!(s.put(tx, "t", b"k", b"v", WriteKind::Insert), StatusCode::Ok);
        s.commit(tx, Box::new(|_| {}));

        let tx2 = occ(&s);
        assert_eq!(s.get(tx2, "t", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let s = InMemoryStorage::new();
        let tx = occ(&s);
        s.put(tx, "t", b"k", b"v", WriteKind::Insert);
        s.commit(tx, Box::new(|_| {}));

        let tx2 = occ(&s);
        assert_eq!(s.put(tx2, "t", b"k", b"v2", WriteKind::Insert), StatusCode::AlreadyExists);
    }

    #[test]
    fn second_writer_to_a_read_key_gets_serialization_failure() {
        let s = InMemoryStorage::new();
        let seed = occ(&s);
        s.put(seed, "t", b"k", b"0", WriteKind::Insert);
        s.commit(seed, Box::new(|_| {}));

        let tx_a = occ(&s);
        let tx_b = occ(&s);
        s.get(tx_a, "t", b"k").unwrap();
        s.get(tx_b, "t", b"k").unwrap();
        s.put(tx_a, "t", b"k", b"a", WriteKind::Update);
        s.put(tx_b, "t", b"k", b"b", WriteKind::Update);

        assert_eq!(s.commit(tx_a, Box::new(|_| {})), StatusCode::Ok);
        assert_eq!(s.commit(tx_b, Box::new(|_| {})), StatusCode::ErrSerializationFailure);
    }

    #[test]
    fn rtx_cannot_write() {
        let s = InMemoryStorage::new();
        let tx = s.open_transaction(TransactionMode::Rtx, TransactionOptions::default()).unwrap();
        assert_eq!(s.put(tx, "t", b"k", b"v", WriteKind::Insert), StatusCode::ErrWriteOperationByRtx);
    }

    #[test]
    fn ltx_without_write_preserve_is_rejected() {
        let s = InMemoryStorage::new();
        let tx = s.open_transaction(TransactionMode::Ltx, TransactionOptions::default()).unwrap();
        assert_eq!(s.put(tx, "t", b"k", b"v", WriteKind::Insert), StatusCode::ErrWriteWithoutWritePreserve);
    }
}
