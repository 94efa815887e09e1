//! Picks how a dump or import is executed and turns it into an ordered list
//! of shell commands.

use std::fmt;
use std::path::Path;

use crate::command::{
    create_database_command, dump_command, import_command, remote_create_database_command,
    remote_dump_command, remote_import_command, ProfileVars, CLIENT_IMPORT, CREATE_DATABASE, DUMP,
};
use crate::config::ResolvedTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Dump,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LocalDump,
    RemoteDump,
    LocalImport,
    RemoteImport,
}

impl Strategy {
    pub fn select(operation: Operation, remote: bool) -> Strategy {
        match (operation, remote) {
            (Operation::Dump, false) => Strategy::LocalDump,
            (Operation::Dump, true) => Strategy::RemoteDump,
            (Operation::Import, false) => Strategy::LocalImport,
            (Operation::Import, true) => Strategy::RemoteImport,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::LocalDump => "local dump",
            Strategy::RemoteDump => "remote dump",
            Strategy::LocalImport => "local import",
            Strategy::RemoteImport => "remote import",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub command: String,
    /// `command` with the password token masked.
    pub display: String,
}

impl Step {
    /// Renders the step twice: once with the real password and once masked.
    fn render(
        name: &'static str,
        task: &ResolvedTask,
        build: impl Fn(&ProfileVars) -> String,
    ) -> Self {
        Step {
            name,
            command: build(&ProfileVars::new(&task.profile)),
            display: build(&ProfileVars::redacted(&task.profile)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub strategy: Strategy,
    pub steps: Vec<Step>,
}

pub fn plan_dump(task: &ResolvedTask) -> Plan {
    let strategy = Strategy::select(Operation::Dump, task.remote.is_some());
    let step = match &task.remote {
        Some(remote) => Step::render(DUMP.name, task, |vars| remote_dump_command(vars, remote)),
        None => Step::render(DUMP.name, task, dump_command),
    };
    Plan {
        strategy,
        steps: vec![step],
    }
}

/// Local imports always create the database first. Remote imports only do so
/// when `create_remote_database` is set.
pub fn plan_import(task: &ResolvedTask, dumpfile: &Path) -> Plan {
    let strategy = Strategy::select(Operation::Import, task.remote.is_some());
    let steps = match &task.remote {
        None => vec![
            Step::render(CREATE_DATABASE.name, task, create_database_command),
            Step::render(CLIENT_IMPORT.name, task, |vars| import_command(vars, dumpfile)),
        ],
        Some(remote) => {
            let mut steps = Vec::with_capacity(2);
            if task.create_remote_database {
                steps.push(Step::render(CREATE_DATABASE.name, task, |vars| {
                    remote_create_database_command(vars, remote)
                }));
            }
            steps.push(Step::render(CLIENT_IMPORT.name, task, |vars| {
                remote_import_command(vars, remote, dumpfile)
            }));
            steps
        }
    };
    Plan { strategy, steps }
}

pub fn plan(task: &ResolvedTask, operation: Operation) -> Plan {
    match operation {
        Operation::Dump => plan_dump(task),
        Operation::Import => plan_import(task, &task.location.file),
    }
}
