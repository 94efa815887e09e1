use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum TaskError {
    MissingOption(&'static str),
    InvalidOption(String),
    UnknownTarget(String),
    ConfigFile(String),
    MissingDumpFile(PathBuf),
    CommandFailed {
        step: &'static str,
        exit_code: i32,
        output: String,
    },
    Io(std::io::Error),
}

impl TaskError {
    /// True for failures raised before any subprocess was started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TaskError::MissingOption(_)
                | TaskError::InvalidOption(_)
                | TaskError::UnknownTarget(_)
                | TaskError::ConfigFile(_)
                | TaskError::MissingDumpFile(_)
        )
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::MissingOption(name) => write!(f, "Missing required option: {name}"),
            TaskError::InvalidOption(msg) => write!(f, "Invalid option: {msg}"),
            TaskError::UnknownTarget(name) => write!(f, "Unknown target: {name}"),
            TaskError::ConfigFile(msg) => write!(f, "Config file error: {msg}"),
            TaskError::MissingDumpFile(path) => {
                write!(f, "Dump file \"{}\" does not exist.", path.display())
            }
            TaskError::CommandFailed { step, exit_code, .. } => {
                write!(f, "Command '{step}' exited with status {exit_code}")
            }
            TaskError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::Io(e)
    }
}
