//! Core-pinned work-stealing task scheduler (§4.D), ported from jogasaki's
//! `scheduler::task_scheduler`.

pub mod config;
pub mod pool;

pub use config::SchedulerConfig;
pub use pool::{Scheduler, TaskId, TaskOutcome, WorkerId};
