//! MySQL dump/import task runner
//!
//! Exports a MySQL database to a backup file and restores it again by driving
//! the `mysqldump`, `mysql` and `ssh` command-line tools.
//!
//! # Features
//!
//! - Named targets in a TOML or JSON task file, with shared defaults
//! - Local execution or execution through an SSH tunnel
//! - Create-then-import sequencing for restores
//! - Dated default backup paths
//! - Dry runs that log the exact (password-redacted) commands

mod command;
mod config;
mod error;
mod runner;
mod strategy;
mod task;

use clap::Parser;
use config::Args;
use log::error;
use std::process::ExitCode;

use crate::runner::ShellRunner;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The local UTC offset can only be read while the process is still
    // single-threaded, so the date is taken before the runtime starts.
    let date = config::today();
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(args, &date))
}

async fn run(args: Args, date: &str) -> ExitCode {
    let path = config::config_path(args.config.as_deref());
    let operation = args.command.operation();

    let resolved = config::load(&path).and_then(|file| {
        config::resolve(
            &file,
            args.command.target(),
            operation,
            args.command.path_override(),
            date,
        )
    });
    let task = match resolved {
        Ok(task) => task,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.dry_run {
        task::dry_run(&task, operation);
        return ExitCode::SUCCESS;
    }

    if task::execute(&ShellRunner, &task, operation).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
