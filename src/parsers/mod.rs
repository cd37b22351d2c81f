//! # Report Parsers
//!
//! Pure functions from the text printed by the router CLI (or the counter tool)
//! to typed [`ParsedReport`](crate::stats::ParsedReport)s. None of them
//! perform I/O.
//!
//! ## Shared Contract
//!
//! - Terminal control sequences are stripped first ([`remove_control_chars`])
//! - Each report is segmented by its own delimiter, rows are whitespace
//!   tokenized and accepted only when the token count matches the schema
//! - Rejected rows are logged at debug level and counted in
//!   `ParsedReport::skipped_rows`
//! - A report whose header is missing parses to an empty report, never an
//!   error
//! - Column labels become field names through [`normalize_identifier`]
//!
//! ## Parsers
//!
//! - [`perfmon`]: `show perfmon statistics`
//! - [`runtime`]: `show runtime`
//! - [`latency`]: `show dpdk latency`
//! - [`perf_stat`]: `perf stat` summary on stderr
//! - [`monitor`]: `monitor interface … count 1`
//! - [`interfaces`]: `show interface` names
//! - [`graph`]: `show vlib graph` node names
//! - [`process`]: `ps -eLo pid,comm` thread table

pub mod graph;
pub mod interfaces;
pub mod latency;
pub mod monitor;
pub mod perf_stat;
pub mod perfmon;
pub mod process;
pub mod runtime;

pub use graph::parse_graph_node_names;
pub use interfaces::parse_interface_names;
pub use latency::parse_latency;
pub use monitor::parse_interface_monitor;
pub use perf_stat::{parse_perf_stat, DEFAULT_PERF_EVENTS};
pub use perfmon::{parse_perfmon, parse_perfmon_inferred, PerfmonSchema};
pub use process::{find_pids, parse_process_table, ProcessEntry};
pub use runtime::{parse_runtime, RuntimeSchema};

use crate::stats::StatValue;
use regex::Regex;
use std::sync::OnceLock;

fn control_sequence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[mGK]").expect("valid control sequence regex"))
}

fn slash_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s?/\s?").expect("valid separator regex"))
}

fn non_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("valid identifier regex"))
}

/// Strip ANSI color and erase sequences (`ESC [ … m|G|K`) from report text.
pub fn remove_control_chars(text: &str) -> String {
    control_sequence().replace_all(text, "").into_owned()
}

/// Turn a column label into a field name.
///
/// ```rust
/// # use batch_sweep::parsers::normalize_identifier;
/// assert_eq!(normalize_identifier("L1I miss/pkt"), "l1i_miss_per_pkt");
/// assert_eq!(normalize_identifier("avg_throughput(pkt/s)"), "avg_throughput_pkt_per_s");
/// ```
pub fn normalize_identifier(label: &str) -> String {
    let spelled = slash_separator().replace_all(label, " per ");
    let collapsed = non_identifier().replace_all(&spelled, "_");
    collapsed.trim_matches('_').to_lowercase()
}

fn clean_number(token: &str) -> String {
    let token = token.trim().replace(',', "");
    match token.strip_prefix('.') {
        Some(rest) => format!("0.{}", rest),
        None => match token.strip_prefix("-.") {
            Some(rest) => format!("-0.{}", rest),
            None => token,
        },
    }
}

/// Parse a float, accepting `.24` and thousands separators.
pub fn parse_float(token: &str) -> Option<f64> {
    clean_number(token).parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer or float, preferring the integer representation.
pub fn parse_number(token: &str) -> Option<StatValue> {
    let cleaned = clean_number(token);
    if let Ok(value) = cleaned.parse::<i64>() {
        return Some(StatValue::Int(value));
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(StatValue::Float)
}

/// Parse a value that may carry a `k`/`m`/`g` (decimal) magnitude suffix, as
/// printed by the interface monitor and by the latency report.
pub fn parse_scaled(token: &str) -> Option<f64> {
    let token = token.trim();
    let (digits, factor) = match token.chars().last() {
        Some('k') | Some('K') => (&token[..token.len() - 1], 1e3),
        Some('m') | Some('M') => (&token[..token.len() - 1], 1e6),
        Some('g') | Some('G') => (&token[..token.len() - 1], 1e9),
        _ => (token, 1.0),
    };
    parse_float(digits.trim()).map(|v| v * factor)
}

/// Scaled value stored as an integer when it is integral.
pub(crate) fn scaled_value(token: &str) -> Option<StatValue> {
    if let Some(value) = parse_number(token) {
        return Some(value);
    }
    parse_scaled(token).map(|v| {
        if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            StatValue::Int(v as i64)
        } else {
            StatValue::Float(v)
        }
    })
}
