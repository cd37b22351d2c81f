//! `show perfmon statistics` parser.
//!
//! The report has a title line, a column header, then one block per thread:
//!
//! ```text
//! cache misses detail
//!       L1I miss/pkt  L1D miss/pkt  L2 miss/pkt  L3 miss/pkt
//! vpp_wk_0 (1)
//!   dpdk-input    13.88  18.14  9.17  0.00
//!   ip4-lookup      .24   1.02   .33  0.00
//! ```
//!
//! The column set depends on the perfmon bundle that was started, so it is
//! described by a [`PerfmonSchema`] rather than hard-coded.

use super::{normalize_identifier, parse_float, remove_control_chars};
use crate::stats::{ParsedReport, ReportKind, StatValue, StatisticRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

fn thread_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+) \((\d+)\)$").expect("valid thread header regex"))
}

/// Ordered column names of a perfmon statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfmonSchema {
    pub name: String,
    pub columns: Vec<String>,
}

impl PerfmonSchema {
    /// Columns printed for the `cache-detail` bundle.
    pub fn cache_detail() -> Self {
        Self::from_labels(
            "cache-detail",
            &["L1I miss/pkt", "L1D miss/pkt", "L2 miss/pkt", "L3 miss/pkt"],
        )
    }

    /// Columns printed for the `cache-hierarchy` bundle.
    pub fn cache_hierarchy() -> Self {
        Self::from_labels(
            "cache-hierarchy",
            &[
                "L1 hit/pkt",
                "L1 miss/pkt",
                "L2 hit/pkt",
                "L2 miss/pkt",
                "L3 hit/pkt",
                "L3 miss/pkt",
            ],
        )
    }

    /// Build a schema from raw column labels; labels are normalized.
    pub fn from_labels(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: labels.iter().map(|l| normalize_identifier(l)).collect(),
        }
    }

    /// Tokens a data row must have: the node name plus one per column.
    pub fn expected_tokens(&self) -> usize {
        self.columns.len() + 1
    }

    /// Derive a schema from a column header line.
    ///
    /// Labels may span several tokens; a label ends at the first token that
    /// contains `/` (`L1I miss/pkt`). Returns `None` when the line does not
    /// split cleanly that way.
    pub fn infer(header: &str) -> Option<Self> {
        let mut columns = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for token in header.split_whitespace() {
            pending.push(token);
            if token.contains('/') {
                columns.push(normalize_identifier(&pending.join(" ")));
                pending.clear();
            }
        }
        if columns.is_empty() || !pending.is_empty() {
            return None;
        }
        Some(Self {
            name: "inferred".to_string(),
            columns,
        })
    }
}

/// Parse with a fixed schema.
pub fn parse_perfmon(text: &str, schema: &PerfmonSchema) -> ParsedReport {
    parse_with(text, |_| schema.clone())
}

/// Parse, deriving the schema from the report's own column header and using
/// `fallback` when that header cannot be interpreted.
pub fn parse_perfmon_inferred(text: &str, fallback: &PerfmonSchema) -> ParsedReport {
    parse_with(text, |header| match header.and_then(PerfmonSchema::infer) {
        Some(schema) => schema,
        None => {
            debug!(
                "perfmon column header not recognized, using the {} schema",
                fallback.name
            );
            fallback.clone()
        }
    })
}

fn parse_with<F>(text: &str, resolve: F) -> ParsedReport
where
    F: FnOnce(Option<&str>) -> PerfmonSchema,
{
    let text = remove_control_chars(text);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut report = ParsedReport::new(ReportKind::Perfmon);

    let first_thread = match lines.iter().position(|l| thread_header().is_match(l)) {
        Some(index) => index,
        None => {
            debug!("no thread header in perfmon statistics, treating report as empty");
            return report;
        }
    };
    let header = lines[..first_thread]
        .iter()
        .rev()
        .find(|l| !l.is_empty())
        .copied();
    let schema = resolve(header);

    let mut current: Option<String> = None;
    for line in &lines[first_thread..] {
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = thread_header().captures(line) {
            let name = caps[1].to_string();
            report.snapshot_mut(&name);
            current = Some(name);
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != schema.expected_tokens() {
            debug!(
                "skipping perfmon row with {} tokens (expected {}): {}",
                tokens.len(),
                schema.expected_tokens(),
                line
            );
            report.skipped_rows += 1;
            continue;
        }
        let values: Option<Vec<f64>> = tokens[1..].iter().map(|t| parse_float(t)).collect();
        let (Some(thread), Some(values)) = (current.as_deref(), values) else {
            debug!("skipping malformed perfmon row: {}", line);
            report.skipped_rows += 1;
            continue;
        };

        let record: StatisticRecord = schema
            .columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(|v| Some(StatValue::Float(v))))
            .collect();
        if !report.snapshot_mut(thread).insert(tokens[0], record) {
            debug!("duplicate perfmon row for {} in {}", tokens[0], thread);
            report.skipped_rows += 1;
        }
    }
    report
}
