//! Shuffle exchanges (§4.G): forward (pass-through), group (sort-based
//! cogroup), and incremental aggregate. Ported from jogasaki's
//! `executor::exchange` namespace (`forward`, `group`, `aggregate`
//! subdirectories) — each exchange kind owns its own input-partition shape
//! and downstream reader, wired together by the flow graph and scheduler
//! rather than by this crate.

pub mod aggregate;
pub mod forward;
pub mod group;
pub mod partition;
pub mod registry;

pub use aggregate::{AggregateColumn, AggregateExchange, AggregateInputPartition, AggregatorKind, Partial};
pub use forward::{ForwardExchange, ForwardPartition, ForwardWriter};
pub use group::{GroupExchange, GroupInputPartition, GroupReader};
pub use partition::Partitioner;
pub use registry::ExchangeRegistry;
