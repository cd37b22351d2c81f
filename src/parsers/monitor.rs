//! `monitor interface <if> interval <s> count 1` parser.

use super::{parse_scaled, remove_control_chars};
use crate::stats::{ParsedReport, ReportKind, StatValue, StatisticRecord};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn rate_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^rx: (\S+)pps (\S+)bps tx: (\S+)pps (\S+)bps$").expect("valid monitor regex")
    })
}

fn direction(pps: &str, bps: &str) -> StatisticRecord {
    [("pps", pps), ("bps", bps)]
        .iter()
        .map(|(name, token)| {
            let value = parse_scaled(token).map(|v| StatValue::Int(v.round() as i64));
            (name.to_string(), value)
        })
        .collect()
}

/// Parse the first rate line of the monitor output into entities `rx` and
/// `tx`, scoped by `interface`.
pub fn parse_interface_monitor(text: &str, interface: &str) -> ParsedReport {
    let text = remove_control_chars(text);
    let mut report = ParsedReport::new(ReportKind::InterfaceMonitor);

    let Some(caps) = text.lines().map(str::trim).find_map(|l| rate_line().captures(l)) else {
        debug!("no rate line in monitor output for {}", interface);
        return report;
    };
    let snapshot = report.snapshot_mut(interface);
    snapshot.insert("rx", direction(&caps[1], &caps[2]));
    snapshot.insert("tx", direction(&caps[3], &caps[4]));
    report
}
