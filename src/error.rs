//! # Error Taxonomy
//!
//! Typed errors raised by the primitives of the harness. Orchestration code
//! (the sweep runner and the binary) wraps these in `anyhow::Error` and decides
//! per configuration whether to continue; the primitives themselves never
//! swallow a failure.
//!
//! - [`InvocationError`]: an external command could not be run, timed out, or
//!   exited non-zero
//! - [`ConfigurationError`]: malformed sweep input, detected before any
//!   command is issued
//! - [`ControlError`]: either of the above, or a counter target that could
//!   not be resolved, as seen by a control-interface operation
//! - [`SchemaConflict`]: a recorded value disagrees with an established column
//!   type; resolved per field by the table sink
//! - [`RecordError`]: a sink could not persist a record
//!
//! A missing report section is deliberately *not* represented here: parsers
//! return an empty report for it.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure to run an external tool.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The child process could not be spawned at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child process exited with a non-zero status in strict mode.
    #[error("{}", render_non_zero_exit(.command, .exit_code, .stdout, .stderr))]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The caller-specified timeout elapsed; the child was killed.
    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl InvocationError {
    /// The shell-quoted command line that failed.
    pub fn command(&self) -> &str {
        match self {
            InvocationError::Spawn { command, .. }
            | InvocationError::NonZeroExit { command, .. }
            | InvocationError::Timeout { command, .. } => command,
        }
    }
}

fn render_non_zero_exit(
    command: &str,
    exit_code: &Option<i32>,
    stdout: &str,
    stderr: &str,
) -> String {
    let mut lines = vec![match exit_code {
        Some(code) => format!("Tool invocation failed with code {}", code),
        None => "Tool invocation terminated by signal".to_string(),
    }];
    lines.push(format!("command: {}", command));
    if !stdout.trim().is_empty() {
        lines.push(format!("stdout:\n{}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        lines.push(format!("stderr:\n{}", stderr.trim_end()));
    }
    lines.join("\n")
}

/// Malformed sweep input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("interface batch configuration must name exactly one interface, got {0}")]
    InterfaceCount(usize),

    #[error("{what} must not be empty")]
    EmptyCandidates { what: &'static str },

    #[error(
        "full combination over {entities} entities and {choices} choices yields {requested} \
         configurations, above the cap of {cap}"
    )]
    CombinationCap {
        entities: usize,
        choices: usize,
        requested: String,
        cap: usize,
    },

    #[error("{apply} does not apply {kind} settings")]
    UnappliedKind { apply: String, kind: &'static str },

    #[error("configuration has no {0} settings to apply")]
    NothingToApply(&'static str),

    #[error("entity `{0}` is not addressable on the target")]
    UnknownEntity(String),

    #[error("entity `{0}` appears more than once")]
    DuplicateEntity(String),

    #[error("invalid configuration line {line}: {message}")]
    InvalidLine { line: usize, message: String },

    #[error("{0}")]
    Invalid(String),
}

/// Failure of a control-interface operation.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("no process has a thread named {}", .0.join(", "))]
    ProcessNotFound(Vec<String>),
}

/// Type disagreement between a recorded value and an existing column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column `{column}` is {column_type} but the value is {value_type}: {resolution}")]
pub struct SchemaConflict {
    pub column: String,
    pub column_type: &'static str,
    pub value_type: &'static str,
    pub resolution: ConflictResolution,
}

/// How a [`SchemaConflict`] was settled for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The value was stored using the wider type.
    Widened,
    /// The value was dropped; the rest of the record was stored.
    Rejected,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::Widened => write!(f, "widened"),
            ConflictResolution::Rejected => write!(f, "field rejected"),
        }
    }
}

/// Failure of a recorder sink.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("experiment id changed from `{expected}` to `{actual}` within one sink")]
    ExperimentIdChanged { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_display_includes_output() {
        let err = InvocationError::NonZeroExit {
            command: "vppctl show runtime".to_string(),
            exit_code: Some(2),
            stdout: "partial".to_string(),
            stderr: "unknown input".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Tool invocation failed with code 2"));
        assert!(text.contains("command: vppctl show runtime"));
        assert!(text.contains("stdout:\npartial"));
        assert!(text.contains("stderr:\nunknown input"));
        assert_eq!(err.command(), "vppctl show runtime");
    }

    #[test]
    fn test_non_zero_exit_display_omits_empty_streams() {
        let err = InvocationError::NonZeroExit {
            command: "false".to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: "  \n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("terminated by signal"));
        assert!(!text.contains("stdout"));
        assert!(!text.contains("stderr"));
    }

    #[test]
    fn test_schema_conflict_display() {
        let conflict = SchemaConflict {
            column: "stat.x".to_string(),
            column_type: "INTEGER",
            value_type: "TEXT",
            resolution: ConflictResolution::Rejected,
        };
        assert_eq!(
            conflict.to_string(),
            "column `stat.x` is INTEGER but the value is TEXT: field rejected"
        );
    }
}
