//! Transaction runtime (§3/§4.H): the per-transaction state machine that
//! sits between the scheduler and the storage interface, ported from
//! jogasaki's `transaction_context` plus the durability-manager and
//! worker-pinning helpers it leans on.

pub mod durability;
pub mod status_mapping;
pub mod termination;
pub mod transaction_context;
pub mod worker_pinning;

pub use durability::{CancelCheck, DurabilityWaitlist, WaitOutcome, WaitlistSnapshot};
pub use status_mapping::map_status_to_error;
pub use termination::{CommitIntent, TerminationState};
pub use transaction_context::{AlreadyTerminating, BlobHold, CommitState, TransactionContext};
pub use worker_pinning::WorkerPinning;
