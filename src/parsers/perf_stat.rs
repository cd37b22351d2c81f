//! `perf stat` summary parser (the summary is printed on stderr).
//!
//! ```text
//!  Performance counter stats for process id '4242':
//!
//!      1,234,567,890      L1-dcache-loads
//!         12,345,678      L1-dcache-load-misses     #    1.00% of all L1-dcache accesses
//!    <not supported>      icache.hit
//!
//!       10.001234567 seconds time elapsed
//! ```

use super::{normalize_identifier, parse_number, remove_control_chars};
use crate::stats::{ParsedReport, ReportKind, StatValue, StatisticRecord};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Counters sampled when no event list is configured.
pub const DEFAULT_PERF_EVENTS: [&str; 10] = [
    "L1-dcache-loads",
    "L1-dcache-load-misses",
    "L1-dcache-store",
    "icache.hit",
    "icache.misses",
    "icache.ifdata_stall",
    "LLC-loads",
    "LLC-load-misses",
    "LLC-stores",
    "L2_RQSTS.ALL_DEMAND_MISS",
];

/// Entity under which the counters of one measurement are stored.
pub const COUNTERS: &str = "counters";

fn stats_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Performance counter stats for (.+):$").expect("valid perf header regex")
    })
}

/// Parse the counter summary into one snapshot named `scope`.
///
/// The scope is supplied by the caller (normally the measured thread names)
/// because the process ids printed in the header change between runs.
pub fn parse_perf_stat(text: &str, scope: &str) -> ParsedReport {
    let text = remove_control_chars(text);
    let mut report = ParsedReport::new(ReportKind::PerfCounters);
    let mut lines = text.lines().map(str::trim);

    let target = match lines.by_ref().find_map(|l| stats_header().captures(l)) {
        Some(caps) => caps[1].to_string(),
        None => {
            debug!("no counter summary header in perf output");
            return report;
        }
    };
    debug!("perf counters for {}", target);

    let mut record = StatisticRecord::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.len() >= 2 && tokens[1] == "seconds" {
            let name = match tokens.get(2..) {
                Some(rest) if !rest.is_empty() => format!("seconds_{}", rest.join("_")),
                _ => "seconds".to_string(),
            };
            match parse_number(tokens[0]) {
                Some(value) => {
                    record.insert(normalize_identifier(&name), Some(value));
                }
                None => report.skipped_rows += 1,
            }
            continue;
        }

        // "<not counted>" and "<not supported>" span two tokens.
        if tokens.len() >= 3 && tokens[0] == "<not" {
            record.insert(normalize_identifier(tokens[2]), None);
            continue;
        }
        if tokens.len() < 2 || tokens[0].starts_with('#') {
            debug!("skipping perf row: {}", line);
            report.skipped_rows += 1;
            continue;
        }
        match parse_number(tokens[0]) {
            Some(value) => {
                let event = tokens[1];
                let value = match (event, value) {
                    ("msec", StatValue::Int(v)) => StatValue::Float(v as f64),
                    (_, value) => value,
                };
                let name = if event == "msec" {
                    tokens.get(2).map(|t| format!("{}_msec", t)).unwrap_or_default()
                } else {
                    event.to_string()
                };
                record.insert(normalize_identifier(&name), Some(value));
            }
            None => {
                debug!("skipping perf row with unparsable value: {}", line);
                report.skipped_rows += 1;
            }
        }
    }

    if !record.is_empty() {
        report.snapshot_mut(scope).insert(COUNTERS, record);
    }
    report
}
