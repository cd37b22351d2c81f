//! # External Command Runner
//!
//! Every interaction with the router and with the counter tool goes through a
//! [`CommandTool`]: a fixed base command (for example
//! `sudo vppctl -s /run/vpp/remote/cli_remote.sock`) that is extended with
//! per-call arguments.
//!
//! ## Behavior
//!
//! - One child process per call; stdin is closed, stdout and stderr are
//!   captured in full
//! - Strict mode (the default) turns a non-zero exit into
//!   [`InvocationError::NonZeroExit`]; non-strict mode hands the output back
//!   for inspection
//! - An optional per-call timeout kills the child and reports
//!   [`InvocationError::Timeout`]
//! - No retries
//!
//! In verbose mode the command line is logged as `+ <command>` and each output
//! line is echoed with a `* ` (stdout) or `E ` (stderr) prefix.

use crate::error::{ConfigurationError, InvocationError};
use crate::utils::shell_join;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Options for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Treat a non-zero exit status as an error.
    pub strict: bool,
    /// Kill the child if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            strict: true,
            timeout: None,
        }
    }
}

impl InvokeOptions {
    /// Non-strict invocation: the caller inspects the exit code.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A base command that is invoked with additional arguments.
#[derive(Debug, Clone)]
pub struct CommandTool {
    command: Vec<String>,
    verbose: bool,
    default_timeout: Option<Duration>,
}

impl CommandTool {
    /// Create a tool from its base command; the command must not be empty.
    pub fn new<I, S>(command: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(ConfigurationError::EmptyCommand);
        }
        Ok(Self {
            command,
            verbose: false,
            default_timeout: None,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Timeout applied when a call does not specify its own.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Shell-quoted command line for `args`, as used in logs and errors.
    pub fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        let mut words: Vec<&str> = self.command.iter().map(String::as_str).collect();
        words.extend(args.iter().map(AsRef::as_ref));
        shell_join(&words)
    }

    /// Strict invocation with the default timeout.
    pub async fn invoke<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput, InvocationError> {
        self.invoke_with(args, InvokeOptions::default()).await
    }

    /// Strict invocation returning stdout as text.
    pub async fn output_text<S: AsRef<str>>(&self, args: &[S]) -> Result<String, InvocationError> {
        Ok(self.invoke(args).await?.stdout_text())
    }

    pub async fn invoke_with<S: AsRef<str>>(
        &self,
        args: &[S],
        options: InvokeOptions,
    ) -> Result<CommandOutput, InvocationError> {
        let command_line = self.command_line(args);
        if self.verbose {
            debug!("+ {}", command_line);
        }

        let mut command = Command::new(&self.command[0]);
        command
            .args(&self.command[1..])
            .args(args.iter().map(AsRef::as_ref))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| InvocationError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let waited = match options.timeout.or(self.default_timeout) {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    return Err(InvocationError::Timeout {
                        command: command_line,
                        timeout,
                    })
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| InvocationError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let result = CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code(),
        };
        if self.verbose {
            for line in result.stdout_text().lines() {
                trace!("* {}", line);
            }
            for line in result.stderr_text().lines() {
                trace!("E {}", line);
            }
        }

        if options.strict && !result.success() {
            return Err(InvocationError::NonZeroExit {
                command: command_line,
                exit_code: result.exit_code,
                stdout: result.stdout_text(),
                stderr: result.stderr_text(),
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> CommandTool {
        CommandTool::new(["sh", "-c"]).unwrap()
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert_eq!(
            CommandTool::new(Vec::<String>::new()).unwrap_err(),
            ConfigurationError::EmptyCommand
        );
        assert!(CommandTool::new([""]).is_err());
    }

    #[test]
    fn test_command_line_quoting() {
        let tool = CommandTool::new(["vppctl", "-s", "/run/vpp/cli.sock"]).unwrap();
        assert_eq!(
            tool.command_line(&["show", "runtime"]),
            "vppctl -s /run/vpp/cli.sock show runtime"
        );
        assert_eq!(tool.command_line(&["echo", "a b"]), "vppctl -s /run/vpp/cli.sock echo 'a b'");
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let output = sh().invoke(&["echo out; echo err >&2"]).await.unwrap();
        assert_eq!(output.stdout_text(), "out\n");
        assert_eq!(output.stderr_text(), "err\n");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_strict_non_zero_exit() {
        let err = sh().invoke(&["echo partial; echo boom >&2; exit 3"]).await.unwrap_err();
        match &err {
            InvocationError::NonZeroExit {
                exit_code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(*exit_code, Some(3));
                assert_eq!(stdout, "partial\n");
                assert_eq!(stderr, "boom\n");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Tool invocation failed with code 3"));
    }

    #[tokio::test]
    async fn test_lenient_returns_output() {
        let output = sh()
            .invoke_with(&["exit 4"], InvokeOptions::lenient())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(4));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let options = InvokeOptions {
            strict: true,
            timeout: Some(Duration::from_millis(100)),
        };
        let err = sh().invoke_with(&["sleep 5"], options).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let tool = CommandTool::new(["/nonexistent/batch-sweep-tool"]).unwrap();
        let err = tool.invoke(&["x"]).await.unwrap_err();
        assert!(matches!(err, InvocationError::Spawn { .. }));
        assert_eq!(err.command(), "/nonexistent/batch-sweep-tool x");
    }
}
