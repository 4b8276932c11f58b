//! Record channels, dump channel file spill, and the structured error
//! taxonomy (§4.I/§7), ported from jogasaki's `error` namespace and its
//! `data_channel`/`dump_channel` executors.

pub mod dump_channel;
pub mod error;
pub mod record_channel;

pub use dump_channel::DumpChannel;
pub use error::{ErrorCode, ErrorInfo, ErrorSlot, Severity, SourceLocation};
pub use record_channel::{InMemoryChannel, RecordChannel, RecordWriter};
