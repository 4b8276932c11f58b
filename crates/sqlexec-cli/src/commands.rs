use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sqlexecd")]
#[command(about = "runs canned plans through the execution engine", long_about = None, version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a handful of rows into an in-memory table, run a scan-and-emit
    /// plan through the engine, and print the decoded result stream.
    #[command(name = "run", about = "run the built-in demo plan")]
    Run(RunArgs),
    /// Submit a batch of synthetic tasks to the scheduler and print the
    /// order in which workers complete them.
    #[command(name = "scheduler-demo", about = "exercise the task scheduler directly")]
    SchedulerDemo(SchedulerDemoArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// number of rows to seed into the demo table
    #[arg(long, default_value_t = 5)]
    pub rows: u32,
}

#[derive(Debug, Parser)]
pub struct SchedulerDemoArgs {
    /// number of synthetic tasks to submit
    #[arg(long, default_value_t = 8)]
    pub tasks: u32,
    /// worker thread count
    #[arg(long, default_value_t = 2)]
    pub threads: usize,
}
