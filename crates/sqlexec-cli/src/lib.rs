//! Thin CLI front-end wiring `clap` argument parsing to the engine's demo
//! entry points, ported in shape from `sqruff-cli-lib`'s `run_with_args`.

use clap::Parser;

use crate::commands::{Cli, Commands};

pub mod commands;
mod commands_run;
mod commands_scheduler_demo;
mod logger;

pub fn run_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let _ = logger::init();
    let cli = Cli::parse_from(args);
    match cli.command {
        Commands::Run(args) => commands_run::run(args),
        Commands::SchedulerDemo(args) => commands_scheduler_demo::run(args),
    }
}
