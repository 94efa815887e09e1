use log::debug;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::TaskError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// stdout and stderr, interleaved as the child wrote them.
    pub output: Vec<u8>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Runs one shell command to completion and captures its output.
    /// `Err` means the command could not be started at all.
    async fn run(&self, command: &str) -> Result<ExecutionResult, TaskError>;
}

/// Runs commands through `sh -c` with stderr folded into stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ShellRunner {
    fn script(command: &str) -> String {
        format!("{{ {command}\n}} 2>&1")
    }
}

impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<ExecutionResult, TaskError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(Self::script(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        // No exit code means the child was killed by a signal.
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Command exited with {exit_code} ({} bytes of output)",
            output.stdout.len()
        );

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(ExecutionResult {
            exit_code,
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let result = ShellRunner
            .run("printf 'out\\n'; printf 'err\\n' >&2")
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.output_lossy(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_pipeline_stderr_is_captured() {
        let result = ShellRunner.run("echo hi >&2 | cat").await.unwrap();
        assert_eq!(result.output_lossy(), "hi\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let result = ShellRunner.run("echo 'access denied'; exit 3").await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.output_lossy(), "access denied\n");
    }

    #[tokio::test]
    async fn test_output_is_verbatim_bytes() {
        let result = ShellRunner.run("printf 'a\\000b\\377'").await.unwrap();
        assert_eq!(result.output, b"a\0b\xff");
    }

    #[test]
    fn test_script_wraps_command() {
        assert_eq!(ShellRunner::script("a | b"), "{ a | b\n} 2>&1");
    }
}
