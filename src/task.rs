use log::{debug, error, info};

use crate::config::ResolvedTask;
use crate::error::TaskError;
use crate::runner::{CommandRunner, ExecutionResult};
use crate::strategy::{plan, plan_dump, plan_import, Operation, Plan};

/// Runs the steps in order and stops at the first one that fails.
/// Returns the result of the last step, or an empty success for a plan
/// without steps.
pub async fn run_plan<R: CommandRunner>(
    runner: &R,
    plan: &Plan,
) -> Result<ExecutionResult, TaskError> {
    debug!("Executing {} plan with {} step(s)", plan.strategy, plan.steps.len());
    let mut last = ExecutionResult::default();
    for step in &plan.steps {
        debug!("Running {}: {}", step.name, step.display);
        let result = runner.run(&step.command).await?;
        if !result.success() {
            return Err(TaskError::CommandFailed {
                step: step.name,
                exit_code: result.exit_code,
                output: result.output_lossy(),
            });
        }
        last = result;
    }
    Ok(last)
}

/// Dumps the database and writes the captured output to the backup file.
pub async fn dump<R: CommandRunner>(runner: &R, task: &ResolvedTask) -> Result<(), TaskError> {
    let location = &task.location;
    tokio::fs::create_dir_all(&location.dir).await?;

    let plan = plan_dump(task);
    let result = run_plan(runner, &plan).await?;

    tokio::fs::write(&location.file, &result.output).await?;
    info!(
        "Wrote {} bytes to '{}'",
        result.output.len(),
        location.file.display()
    );
    Ok(())
}

/// Imports the backup file. The file has to exist locally in both modes: the
/// shell redirect feeding the client (or the tunnel) reads it on this host.
pub async fn import<R: CommandRunner>(runner: &R, task: &ResolvedTask) -> Result<(), TaskError> {
    let dumpfile = &task.location.file;
    if !tokio::fs::try_exists(dumpfile).await? {
        return Err(TaskError::MissingDumpFile(dumpfile.clone()));
    }

    let plan = plan_import(task, dumpfile);
    run_plan(runner, &plan).await?;
    Ok(())
}

/// Logs the commands an invocation would run.
pub fn dry_run(task: &ResolvedTask, operation: Operation) {
    let plan = plan(task, operation);
    info!(
        "Dry run of target '{}' ({}), nothing will be executed",
        task.target, plan.strategy
    );
    for step in &plan.steps {
        info!("  {}: {}", step.name, step.display);
    }
}

/// Entry point shared by both operations. Logs the outcome and reports
/// success as a boolean, like a task runner expects.
pub async fn execute<R: CommandRunner>(
    runner: &R,
    task: &ResolvedTask,
    operation: Operation,
) -> bool {
    let outcome = match operation {
        Operation::Dump => {
            info!(
                "Dumping database '{}' to '{}'",
                task.title,
                task.location.file.display()
            );
            dump(runner, task).await
        }
        Operation::Import => {
            info!(
                "Importing database '{}' from '{}'",
                task.title,
                task.location.file.display()
            );
            import(runner, task).await
        }
    };

    match (operation, outcome) {
        (Operation::Dump, Ok(())) => {
            info!("Database dump successfully exported");
            true
        }
        (Operation::Import, Ok(())) => {
            info!("Database dump successfully imported");
            true
        }
        (operation, Err(e)) => {
            if let TaskError::CommandFailed { output, .. } = &e {
                error!("{}", output.trim_end());
            }
            if e.is_configuration() {
                error!("Configuration error: {e}");
            } else {
                error!("{e}");
            }
            match operation {
                Operation::Dump => error!("Database dump failed!"),
                Operation::Import => error!("Database import failed!"),
            }
            false
        }
    }
}
