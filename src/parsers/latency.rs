//! `show dpdk latency` parser.
//!
//! ```text
//! current time_diff(s): 1619
//! Ethernet1, avg_throughput(pkt/s): 14880000, avg_lat(ns): 812, timeout_pkts: 3, total_pkts: 240000000, imissed: 0
//! Ethernet1, protocol_identifier: 6, avg_throughput(pkt/s): 7440000, avg_lat(ns): 790, timeout_pkts: 1, total_pkts: 120000000
//! ```
//!
//! Rows are self-describing `key: value` lists, so the schema check is that
//! every comma-separated part after the interface name is a `key: value`
//! pair with a numeric value. Interface rows become entity `total`, protocol
//! rows become `protocol_<id>`, both scoped by interface.

use super::{normalize_identifier, parse_float, remove_control_chars, scaled_value};
use crate::stats::{ParsedReport, ReportKind, StatValue, StatisticRecord};
use tracing::debug;

/// Entity holding the interface-level totals.
pub const TOTAL: &str = "total";

const TIME_DIFF_PREFIX: &str = "current time_diff(s):";
const PROTOCOL_KEY: &str = "protocol_identifier";

fn parse_pairs(parts: &[&str]) -> Option<Vec<(String, StatValue)>> {
    parts
        .iter()
        .map(|part| {
            let (key, value) = part.split_once(':')?;
            let key = normalize_identifier(key);
            if key.is_empty() {
                return None;
            }
            scaled_value(value).map(|v| (key, v))
        })
        .collect()
}

pub fn parse_latency(text: &str) -> ParsedReport {
    let text = remove_control_chars(text);
    let mut report = ParsedReport::new(ReportKind::Latency);
    let mut time_diff: Option<f64> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(TIME_DIFF_PREFIX) {
            time_diff = parse_float(rest);
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let interface = parts[0];
        let pairs = match parse_pairs(&parts[1..]) {
            Some(pairs) if !pairs.is_empty() && !interface.contains(':') => pairs,
            _ => {
                debug!("skipping malformed dpdk latency row: {}", line);
                report.skipped_rows += 1;
                continue;
            }
        };

        let mut entity = TOTAL.to_string();
        let mut record = StatisticRecord::new();
        for (key, value) in pairs {
            if key == PROTOCOL_KEY {
                entity = format!("protocol_{}", value);
            } else {
                record.insert(key, Some(value));
            }
        }
        if entity == TOTAL {
            record.insert("time_diff_s", time_diff.map(StatValue::Float));
        }
        if !report.snapshot_mut(interface).insert(entity, record) {
            debug!("duplicate dpdk latency row: {}", line);
            report.skipped_rows += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
current time_diff(s): 1619
Ethernet1, avg_throughput(pkt/s): 14880000, avg_throughput(bits/s): 7618560000, avg_lat(ns): 812, timeout_pkts: 3, total_pkts: 240000000, imissed: 0, total_latency: 194880000000
Ethernet1, protocol_identifier: 6, avg_throughput(pkt/s): 7440000, avg_throughput(bits/s): 3809280000, avg_lat(ns): 790, timeout_pkts: 1, total_pkts: 120000000, total_latency: 94800000000
Ethernet1, protocol_identifier: 17, avg_throughput(pkt/s): 7440000, avg_lat(ns) 834
Ethernet0, avg_throughput(pkt/s): 0, avg_lat(ns): 0, timeout_pkts: 0, total_pkts: 0, imissed: 12
";

    #[test]
    fn test_interface_totals() {
        let report = parse_latency(REPORT);
        let total = report.snapshot("Ethernet1").unwrap().get(TOTAL).unwrap();
        assert_eq!(
            total.get("avg_throughput_pkt_per_s"),
            Some(Some(&StatValue::Int(14_880_000)))
        );
        assert_eq!(total.get("avg_lat_ns"), Some(Some(&StatValue::Int(812))));
        assert_eq!(total.get("imissed"), Some(Some(&StatValue::Int(0))));
        assert_eq!(total.get_f64("time_diff_s"), Some(1619.0));
    }

    #[test]
    fn test_protocol_rows_are_separate_entities() {
        let report = parse_latency(REPORT);
        let eth1 = report.snapshot("Ethernet1").unwrap();
        let tcp = eth1.get("protocol_6").unwrap();
        assert_eq!(tcp.get("avg_lat_ns"), Some(Some(&StatValue::Int(790))));
        assert!(!tcp.contains("protocol_identifier"));
        assert!(!tcp.contains("imissed"));
        assert!(eth1.get("protocol_17").is_none());
    }

    #[test]
    fn test_malformed_rows_are_counted() {
        let report = parse_latency(REPORT);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.scopes(), vec!["Ethernet1", "Ethernet0"]);
    }

    #[test]
    fn test_missing_time_diff_is_unknown() {
        let report = parse_latency("Ethernet0, avg_lat(ns): 10\n");
        let total = report.snapshot("Ethernet0").unwrap().get(TOTAL).unwrap();
        assert_eq!(total.get("time_diff_s"), Some(None));
    }

    #[test]
    fn test_empty_output() {
        let report = parse_latency("");
        assert!(report.is_empty());
        assert_eq!(report.skipped_rows, 0);
    }
}
