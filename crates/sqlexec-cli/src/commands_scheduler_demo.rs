//! Backing for the `scheduler-demo` subcommand: submits a batch of synthetic
//! tasks directly to the scheduler (bypassing the engine/flow layers
//! entirely) and prints the order in which workers report completion, the
//! same demonstration shape as the source project's standalone scheduler
//! exerciser.

use std::sync::mpsc;

use sqlexec_scheduler::{Scheduler, SchedulerConfig, TaskOutcome};

use crate::commands::SchedulerDemoArgs;

pub fn run(args: SchedulerDemoArgs) -> i32 {
    let scheduler = Scheduler::start(SchedulerConfig { thread_count: args.threads, ..SchedulerConfig::default() });
    let (tx, rx) = mpsc::channel();

    for n in 0..args.tasks {
        let tx = tx.clone();
        let id = scheduler.alloc_task_id();
        scheduler.schedule(id, move |worker| {
            tx.send((n, worker)).expect("scheduler demo receiver dropped");
            TaskOutcome::Completed
        });
    }
    drop(tx);

    for (n, worker) in rx {
        println!("task {n} completed on worker {}", worker.0);
    }

    scheduler.stop();
    0
}
