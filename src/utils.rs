//! # Utility Functions and Helper Module
//!
//! This module provides small helpers used throughout the sweep harness:
//! experiment identifiers, human-readable formatting, shell quoting for log
//! output, and validation of user-supplied sweep parameters.
//!
//! ## Key Functionality Categories
//!
//! - **Identifiers**: Timestamp-based experiment ids
//! - **Formatting**: Human-readable durations and progress indicators
//! - **Quoting**: Shell-style rendering of command lines for logs and errors
//! - **Validation**: Input parameter validation with clear error messages
//! - **System Information**: CPU core detection
//!
//! ## Usage Examples
//!
//! ```rust
//! use batch_sweep::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Format durations for display
//! assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
//!
//! // Render a command line the way it would be typed
//! assert_eq!(shell_join(&["vppctl", "show", "node counters"]), "vppctl show 'node counters'");
//!
//! // Validate configuration parameters
//! validate_batch_size(64)?; // OK
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use chrono::Local;
use std::borrow::Cow;
use std::time::Duration;

/// Largest vector the router hands to a graph node in one dispatch.
pub const MAX_FRAME_SIZE: u32 = 256;

/// Generate an experiment identifier from the local time
///
/// Produces a `%Y%m%d%H%M%S` timestamp such as `20240105143012`. The id is
/// generated once per sweep and substituted into the `{experiment_id}`
/// placeholder of every recorder path, so all records of one sweep share
/// one table and one file.
///
/// ## Returns
/// 14-digit local timestamp string
///
/// ## Uniqueness
///
/// Two sweeps started within the same second get the same id. Pass an
/// explicit id on the command line when sweeps are started back to back.
pub fn generate_experiment_id() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Format duration in a human-readable way
///
/// Converts a Duration to a human-readable string, automatically selecting
/// the most appropriate unit based on the magnitude.
///
/// ## Parameters
/// - `duration`: The Duration to format
///
/// ## Returns
/// Human-readable duration string with appropriate units and precision
///
/// ## Unit Selection Logic
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use batch_sweep::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(10)), "10.00s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
}

/// Quote one word for a POSIX shell
///
/// Words made only of safe characters are returned unchanged. Anything else
/// is wrapped in single quotes, with embedded single quotes written as
/// `'"'"'`.
///
/// ## Examples
///
/// ```rust
/// # use batch_sweep::utils::shell_quote;
/// assert_eq!(shell_quote("ip4-lookup"), "ip4-lookup");
/// assert_eq!(shell_quote("a b"), "'a b'");
/// assert_eq!(shell_quote(""), "''");
/// assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
/// ```
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', "'\"'\"'")))
    }
}

/// Join words into a single shell-quoted command line
///
/// Used for the `+ <command>` log lines and for the command recorded in
/// invocation errors. The result is for display only; commands are always
/// spawned with an argument vector, never through a shell.
pub fn shell_join(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a batch size
///
/// ## Parameters
/// - `size`: Requested vector size for a node or an interface
///
/// ## Returns
/// - `Ok(())`: Size is between 1 and [`MAX_FRAME_SIZE`]
/// - `Err(anyhow::Error)`: Size is zero or larger than a frame
///
/// ## Usage Context
///
/// Applied to every size list given on the command line before the first
/// configuration is generated, so a typo fails the sweep before any router
/// command is issued.
pub fn validate_batch_size(size: u32) -> Result<()> {
    if size == 0 {
        anyhow::bail!("Batch size cannot be zero");
    }
    if size > MAX_FRAME_SIZE {
        anyhow::bail!(
            "Batch size {} exceeds the frame size of {}",
            size,
            MAX_FRAME_SIZE
        );
    }
    Ok(())
}

/// Validate the number of measurements per configuration
pub fn validate_repeat_count(repeat_count: usize) -> Result<()> {
    if repeat_count == 0 {
        anyhow::bail!("Repeat count cannot be zero");
    }
    Ok(())
}

/// Validate an entity (node, interface or thread) name
///
/// Names are passed to the router CLI as single words, so they must be
/// non-empty and free of whitespace.
pub fn validate_entity_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Entity name cannot be empty");
    }
    if name.chars().any(char::is_whitespace) {
        anyhow::bail!("Entity name {:?} contains whitespace", name);
    }
    Ok(())
}

/// Get the number of CPU cores available
///
/// Recorded in the sweep summary so results from different hosts can be
/// told apart.
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Create a progress bar-like indicator
///
/// Generates a visual progress indicator string using Unicode block characters
/// to show how many configurations of a sweep have been processed.
///
/// ## Parameters
/// - `current`: Current progress value
/// - `total`: Total expected value
/// - `width`: Width of progress bar in characters
///
/// ## Returns
/// String containing progress bar visualization
///
/// ## Edge Cases
///
/// - **Zero Total**: Returns all filled blocks to avoid division by zero
/// - **Overflow**: Caps progress at 100% even if current > total
///
/// ## Examples
///
/// ```rust
/// # use batch_sweep::utils::create_progress_indicator;
/// assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
/// assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
/// assert_eq!(create_progress_indicator(100, 100, 10), "██████████");
/// ```
pub fn create_progress_indicator(current: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "█".repeat(width);
    }

    let progress = (current as f64 / total as f64).min(1.0);
    let filled = ((progress * width as f64) as usize).min(width);
    let empty = width - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test duration formatting with various time scales
    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    /// Test experiment id shape
    #[test]
    fn test_generate_experiment_id() {
        let id = generate_experiment_id();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_shell_join() {
        assert_eq!(
            shell_join(&["sudo", "vppctl", "-s", "/run/vpp/remote/cli_remote.sock", "show", "runtime"]),
            "sudo vppctl -s /run/vpp/remote/cli_remote.sock show runtime"
        );
        assert_eq!(shell_join(&["perf", "stat", "-e", "a,b", ""]), "perf stat -e a,b ''");
        assert_eq!(shell_join(&["echo", "$HOME"]), "echo '$HOME'");
    }

    /// Test batch size validation rules
    #[test]
    fn test_validate_batch_size() {
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(256).is_ok());
        assert!(validate_batch_size(0).is_err());
        assert!(validate_batch_size(257).is_err());
    }

    #[test]
    fn test_validate_repeat_count() {
        assert!(validate_repeat_count(1).is_ok());
        assert!(validate_repeat_count(0).is_err());
    }

    #[test]
    fn test_validate_entity_name() {
        assert!(validate_entity_name("nat44-ed-in2out").is_ok());
        assert!(validate_entity_name("").is_err());
        assert!(validate_entity_name("ip4 lookup").is_err());
    }

    #[test]
    fn test_get_cpu_cores() {
        assert!(get_cpu_cores() > 0);
    }

    /// Test progress indicator visualization
    #[test]
    fn test_create_progress_indicator() {
        assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
        assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
        assert_eq!(create_progress_indicator(100, 100, 10), "██████████");
        assert_eq!(create_progress_indicator(3, 0, 4), "████");
    }
}
