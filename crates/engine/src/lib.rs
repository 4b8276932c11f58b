//! Request orchestrator (§4.J): job allocation, operator-tree construction
//! from a compiled plan, flow-graph activation, and transaction commit/abort,
//! plus the engine's configuration surface (§6). Ported from jogasaki's
//! `api::impl_::database` as the crate every other component's runtime
//! behavior is wired together behind.

pub mod config;
pub mod engine;
pub mod job;
pub mod plan;

pub use config::EngineConfig;
pub use engine::{Engine, Request, TableInfo};
pub use job::{Job, JobId, JobIdAllocator, JobStatistics};
pub use plan::{CompiledPlan, ExchangePlan, OperatorBuilder, StepPlan};
