//! Record containers (§3/§4.C): an append-only iterable store, a
//! single-producer/single-consumer FIFO queue, pointer tables for shuffle
//! shards, and a result store flattening per-partition output. Ported from
//! jogasaki's `data` namespace.

pub mod fifo;
pub mod iterable;
pub mod pointer_table;
pub mod result_store;

pub use fifo::FifoRecordStore;
pub use iterable::IterableRecordStore;
pub use pointer_table::{PointerTable, PointerTableSeries};
pub use result_store::ResultStore;
