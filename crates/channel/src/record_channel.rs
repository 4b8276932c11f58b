//! Record channel abstraction (§4.I/§6): the output destination for query
//! result rows, ported from the `data_channel`/`writer` shapes the request
//! layer hands the engine (`original_source/src/jogasaki/api/impl/...` call
//! sites that acquire a writer per result-set).
//!
//! A channel hands out one or more [`RecordWriter`]s; exactly one writer may
//! be *ordered* (used for `ORDER BY` queries, §4.I), otherwise multiple
//! writers may be acquired concurrently, one per output partition.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sqlexec_record::RecordMeta;

use crate::error::{ErrorCode, ErrorInfo};

pub trait RecordWriter: Send {
    /// Write one encoded row (the §4.B tag-length stream for a `row(n)`
    /// frame). Writers flush at their own discretion; there is no implicit
    /// per-row flush.
    fn write_row(&mut self, bytes: &[u8]) -> Result<(), ErrorInfo>;

    /// Flush any buffered rows.
    fn commit(&mut self) -> Result<(), ErrorInfo>;
}

pub trait RecordChannel: Send + Sync {
    /// Declare the row shape for every writer subsequently acquired.
    fn meta(&self, meta: RecordMeta);

    /// Acquire a writer. `ordered: true` requests the single ordered writer
    /// a channel exposes for `ORDER BY` queries; acquiring a second ordered
    /// writer is a caller error, surfaced as `InternalException`.
    fn acquire(&self, ordered: bool) -> Result<Box<dyn RecordWriter>, ErrorInfo>;
}

/// In-memory reference channel: every acquired writer appends its rows
/// (still wire-encoded) into a shared buffer, in acquisition/commit order.
/// Used by the engine's own tests and by [`crate::dump_channel::DumpChannel`]
/// as the "parent" that receives spilled filenames as rows.
///
/// Always constructed behind an `Arc` (via [`InMemoryChannel::new`]) because
/// writers must outlive the borrow that acquired them — they're boxed into
/// scheduler task closures that run on a worker thread.
pub struct InMemoryChannel {
    me: Weak<InMemoryChannel>,
    meta: Mutex<Option<RecordMeta>>,
    rows: Mutex<Vec<Vec<u8>>>,
    ordered_acquired: Mutex<bool>,
}

impl InMemoryChannel {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            meta: Mutex::new(None),
            rows: Mutex::new(Vec::new()),
            ordered_acquired: Mutex::new(false),
        })
    }

    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.rows.lock().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }
}

struct ChannelWriter {
    channel: Arc<InMemoryChannel>,
    pending: Vec<Vec<u8>>,
}

impl RecordWriter for ChannelWriter {
    fn write_row(&mut self, bytes: &[u8]) -> Result<(), ErrorInfo> {
        self.pending.push(bytes.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ErrorInfo> {
        self.channel.rows.lock().extend(self.pending.drain(..));
        Ok(())
    }
}

impl RecordChannel for InMemoryChannel {
    fn meta(&self, meta: RecordMeta) {
        *self.meta.lock() = Some(meta);
    }

    fn acquire(&self, ordered: bool) -> Result<Box<dyn RecordWriter>, ErrorInfo> {
        if ordered {
            let mut flag = self.ordered_acquired.lock();
            if *flag {
                return Err(ErrorInfo::new(
                    ErrorCode::InternalException,
                    "an ordered writer has already been acquired for this channel",
                ));
            }
            *flag = true;
        }
        let channel = self.me.upgrade().expect("InMemoryChannel always lives behind its own Arc");
        Ok(Box::new(ChannelWriter { channel, pending: Vec::new() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_rows_are_visible_only_after_commit() {
        let channel = InMemoryChannel::new();
        let mut w = channel.acquire(false).unwrap();
        w.write_row(b"row-a").unwrap();
        assert_eq!(channel.row_count(), 0);
        w.commit().unwrap();
        assert_eq!(channel.row_count(), 1);
    }

    #[test]
    fn second_ordered_writer_is_rejected() {
        let channel = InMemoryChannel::new();
        let _first = channel.acquire(true).unwrap();
        let second = channel.acquire(true);
        assert!(second.is_err());
    }

    #[test]
    fn multiple_unordered_writers_are_allowed() {
        let channel = InMemoryChannel::new();
        assert!(channel.acquire(false).is_ok());
        assert!(channel.acquire(false).is_ok());
    }
}
