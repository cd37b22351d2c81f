//! `show runtime` parser.
//!
//! One section per thread, sections separated by a row of dashes:
//!
//! ```text
//! Thread 1 vpp_wk_0 (lcore 2)
//! Time 168135.7, 10 sec internal node vector rate 0.00 loops/sec 159186.44
//!   vector rates in 1.4880e7, out 1.4880e7, drop 0.0000e0, punt 0.0000e0
//!              Name                 State    Calls   Vectors  Suspends   Clocks  Vectors/Call  Avg DPC/Call  Total DTO
//! dpdk-input                       polling   91231   2913212         0   1.23e1         31.93         12.00          0
//! ---------------
//! ```
//!
//! The vector rates line is stored as the pseudo-entity `vector_rates`.

use super::{parse_float, remove_control_chars};
use crate::stats::{ParsedReport, ReportKind, StatValue, StatisticRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Entity name under which the per-thread vector rates are stored.
pub const VECTOR_RATES: &str = "vector_rates";

/// Node states that VPP prints as two words.
const MULTI_WORD_STATES: [&str; 3] = ["event wait", "interrupt wait", "any wait"];

fn thread_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Thread \d+ (.+) \(lcore \d+\)$").expect("valid runtime title regex")
    })
}

fn vector_rates() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^vector rates in (\S+), out (\S+), drop (\S+), punt (\S+)$")
            .expect("valid vector rates regex")
    })
}

/// Numeric representation of a runtime column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberKind {
    Integer,
    Float,
}

/// Numeric columns following `<node> <state>` in a runtime row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSchema {
    pub columns: Vec<(String, NumberKind)>,
}

impl RuntimeSchema {
    /// Columns printed by the batching build, which adds the dispatch
    /// counters.
    pub fn batching() -> Self {
        Self::from_columns(&[
            ("calls", NumberKind::Integer),
            ("vectors", NumberKind::Integer),
            ("suspends", NumberKind::Integer),
            ("clocks", NumberKind::Float),
            ("vectors_per_call", NumberKind::Float),
            ("avg_dpc_per_call", NumberKind::Float),
            ("total_dto", NumberKind::Integer),
        ])
    }

    /// Columns printed by an unmodified router build.
    pub fn stock() -> Self {
        Self::from_columns(&[
            ("calls", NumberKind::Integer),
            ("vectors", NumberKind::Integer),
            ("suspends", NumberKind::Integer),
            ("clocks", NumberKind::Float),
            ("vectors_per_call", NumberKind::Float),
        ])
    }

    fn from_columns(columns: &[(&str, NumberKind)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
        }
    }

    /// Node name, state, then one token per numeric column.
    pub fn expected_tokens(&self) -> usize {
        self.columns.len() + 2
    }
}

impl Default for RuntimeSchema {
    fn default() -> Self {
        Self::batching()
    }
}

fn parse_as(token: &str, kind: NumberKind) -> Option<StatValue> {
    match kind {
        NumberKind::Float => parse_float(token).map(StatValue::Float),
        NumberKind::Integer => match token.replace(',', "").parse::<i64>() {
            Ok(v) => Some(StatValue::Int(v)),
            Err(_) => parse_float(token)
                .filter(|v| v.fract() == 0.0)
                .map(|v| StatValue::Int(v as i64)),
        },
    }
}

/// Join a two-word state into one token so the row can be counted.
fn collapse_state(tokens: Vec<&str>) -> Vec<String> {
    if tokens.len() >= 3 {
        let pair = format!("{} {}", tokens[1], tokens[2]);
        if MULTI_WORD_STATES.contains(&pair.as_str()) {
            let mut collapsed = vec![tokens[0].to_string(), pair];
            collapsed.extend(tokens[3..].iter().map(|t| t.to_string()));
            return collapsed;
        }
    }
    tokens.into_iter().map(str::to_string).collect()
}

fn is_section_delimiter(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '-')
}

pub fn parse_runtime(text: &str, schema: &RuntimeSchema) -> ParsedReport {
    let text = remove_control_chars(text);
    let mut report = ParsedReport::new(ReportKind::Runtime);

    let mut sections: Vec<Vec<&str>> = vec![Vec::new()];
    for line in text.lines().map(str::trim) {
        if is_section_delimiter(line) {
            sections.push(Vec::new());
        } else if !line.is_empty() {
            if let Some(section) = sections.last_mut() {
                section.push(line);
            }
        }
    }

    for section in sections.iter().filter(|s| !s.is_empty()) {
        let Some(caps) = thread_title().captures(section[0]) else {
            debug!("runtime section without a thread title: {}", section[0]);
            continue;
        };
        let thread = caps[1].to_string();
        report.snapshot_mut(&thread);

        for line in &section[1..] {
            if line.starts_with("Time ") || line.starts_with("Name ") {
                continue;
            }
            if let Some(rates) = vector_rates().captures(line) {
                let record: StatisticRecord = ["in", "out", "drop", "punt"]
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.to_string(), parse_float(&rates[i + 1]).map(StatValue::Float)))
                    .collect();
                report.snapshot_mut(&thread).insert(VECTOR_RATES, record);
                continue;
            }

            let tokens = collapse_state(line.split_whitespace().collect());
            if tokens.len() != schema.expected_tokens() {
                debug!(
                    "skipping runtime row with {} tokens (expected {}): {}",
                    tokens.len(),
                    schema.expected_tokens(),
                    line
                );
                report.skipped_rows += 1;
                continue;
            }
            let values: Option<Vec<StatValue>> = schema
                .columns
                .iter()
                .zip(&tokens[2..])
                .map(|((_, kind), token)| parse_as(token, *kind))
                .collect();
            let Some(values) = values else {
                debug!("skipping runtime row with unparsable values: {}", line);
                report.skipped_rows += 1;
                continue;
            };

            let mut record = StatisticRecord::new();
            record.insert("state", Some(StatValue::Text(tokens[1].clone())));
            for ((name, _), value) in schema.columns.iter().zip(values) {
                record.insert(name.clone(), Some(value));
            }
            if !report.snapshot_mut(&thread).insert(tokens[0].clone(), record) {
                report.skipped_rows += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Thread 0 vpp_main (lcore 0)
Time 168135.7, 10 sec internal node vector rate 0.00 loops/sec 159186.44
  vector rates in 0.0000e0, out 0.0000e0, drop 0.0000e0, punt 0.0000e0
             Name                 State         Calls          Vectors        Suspends         Clocks       Vectors/Call     Avg DPC/Call    Total DTO
dpdk-process                     any wait                 0               0              56          1.21e4            0.00            0.00            0
unix-epoll-input                 polling              98211               0               0          2.34e3            0.00            0.00            0
---------------
Thread 1 vpp_wk_0 (lcore 2)
Time 168135.7, 10 sec internal node vector rate 31.93 loops/sec 91231.00
  vector rates in 1.4880e7, out 1.4880e7, drop 0.0000e0, punt 0.0000e0
             Name                 State         Calls          Vectors        Suspends         Clocks       Vectors/Call     Avg DPC/Call    Total DTO
dpdk-input                       polling              91231         2913212               0          1.23e1           31.93           12.00            4
ip4-lookup                       active               91231         2913212               0          8.10e0           31.93           12.00            0
nat44-ed-in2out                  active               91231
";

    #[test]
    fn test_sections_and_threads() {
        let report = parse_runtime(REPORT, &RuntimeSchema::batching());
        assert_eq!(report.scopes(), vec!["vpp_main", "vpp_wk_0"]);
        assert_eq!(report.skipped_rows, 1);
    }

    #[test]
    fn test_multi_word_state_is_collapsed() {
        let report = parse_runtime(REPORT, &RuntimeSchema::batching());
        let record = report.snapshot("vpp_main").unwrap().get("dpdk-process").unwrap();
        assert_eq!(
            record.get("state"),
            Some(Some(&StatValue::Text("any wait".to_string())))
        );
        assert_eq!(record.get("suspends"), Some(Some(&StatValue::Int(56))));
        assert_eq!(record.get_f64("clocks"), Some(12100.0));
    }

    #[test]
    fn test_row_fields_and_types() {
        let report = parse_runtime(REPORT, &RuntimeSchema::batching());
        let record = report.snapshot("vpp_wk_0").unwrap().get("dpdk-input").unwrap();
        assert_eq!(record.len(), 8);
        assert_eq!(record.get("calls"), Some(Some(&StatValue::Int(91231))));
        assert_eq!(record.get("vectors"), Some(Some(&StatValue::Int(2913212))));
        assert_eq!(record.get_f64("vectors_per_call"), Some(31.93));
        assert_eq!(record.get_f64("avg_dpc_per_call"), Some(12.0));
        assert_eq!(record.get("total_dto"), Some(Some(&StatValue::Int(4))));
    }

    #[test]
    fn test_vector_rates_entity() {
        let report = parse_runtime(REPORT, &RuntimeSchema::batching());
        let rates = report.snapshot("vpp_wk_0").unwrap().get(VECTOR_RATES).unwrap();
        assert_eq!(rates.get_f64("in"), Some(1.488e7));
        assert_eq!(rates.get_f64("drop"), Some(0.0));
    }

    #[test]
    fn test_stock_schema_rejects_batching_rows() {
        let report = parse_runtime(REPORT, &RuntimeSchema::stock());
        assert_eq!(report.skipped_rows, 5);
        assert_eq!(report.snapshot("vpp_wk_0").unwrap().len(), 1);
    }

    #[test]
    fn test_untitled_output_is_empty() {
        let report = parse_runtime("unknown input `show runtim'\n", &RuntimeSchema::batching());
        assert!(report.is_empty());
        assert!(report.scopes().is_empty());
    }
}
