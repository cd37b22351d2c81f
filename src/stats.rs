//! # Statistics Model
//!
//! Shared record types produced by every report parser and consumed by every
//! recorder sink.
//!
//! - [`StatisticRecord`]: flat, ordered set of named values for one entity
//! - [`ThreadSnapshot`]: entity name → record, scoped to one worker thread
//!   (or one interface / one counter target for reports without threads)
//! - [`ParsedReport`]: the snapshots produced by one report invocation
//! - [`MergedStats`]: several reports combined per scope and entity, with every
//!   field namespaced by the report kind that produced it
//!
//! Values that a report did not provide are stored as `None` and serialized
//! as `null`; they are never replaced by zero.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A single statistic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Int(v) => Some(*v as f64),
            StatValue::Float(v) => Some(*v),
            StatValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(v) => write!(f, "{}", v),
            StatValue::Float(v) => write!(f, "{}", v),
            StatValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Named fields for one entity at one point in time, in report column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticRecord {
    fields: Vec<(String, Option<StatValue>)>,
}

impl StatisticRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field. Returns `false` and leaves the record untouched when the
    /// field already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<StatValue>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.fields.push((name, value));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    /// Value of a field; `None` when the field is absent, `Some(None)` when the
    /// field is present but unknown.
    pub fn get(&self, name: &str) -> Option<Option<&StatValue>> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_ref())
    }

    /// Float view of a field, `None` when absent, unknown or textual.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).flatten().and_then(StatValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&StatValue>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

impl FromIterator<(String, Option<StatValue>)> for StatisticRecord {
    fn from_iter<T: IntoIterator<Item = (String, Option<StatValue>)>>(iter: T) -> Self {
        let mut record = StatisticRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for StatisticRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Records of every entity reported for one scope (usually a worker thread).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadSnapshot {
    pub name: String,
    entities: Vec<(String, StatisticRecord)>,
}

impl ThreadSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    /// Add an entity. The first record for a given entity wins; a repeated
    /// entity is reported back as `false`.
    pub fn insert(&mut self, entity: impl Into<String>, record: StatisticRecord) -> bool {
        let entity = entity.into();
        if self.get(&entity).is_some() {
            return false;
        }
        self.entities.push((entity, record));
        true
    }

    pub fn get(&self, entity: &str) -> Option<&StatisticRecord> {
        self.entities
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &StatisticRecord)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for ThreadSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entities.len()))?;
        for (k, v) in &self.entities {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Report families understood by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    /// `show perfmon statistics`
    Perfmon,
    /// `show runtime`
    Runtime,
    /// `show dpdk latency`
    Latency,
    /// Counter tool summary for the measured processes
    PerfCounters,
    /// `monitor interface … count 1`
    InterfaceMonitor,
}

impl ReportKind {
    /// Field namespace used when reports are merged.
    pub fn namespace(&self) -> &'static str {
        match self {
            ReportKind::Perfmon => "perfmon",
            ReportKind::Runtime => "runtime",
            ReportKind::Latency => "latency",
            ReportKind::PerfCounters => "perf",
            ReportKind::InterfaceMonitor => "monitor",
        }
    }

    /// Whether the report is organized per worker thread, so that a thread
    /// filter applies to its scopes.
    pub fn is_threaded(&self) -> bool {
        matches!(self, ReportKind::Perfmon | ReportKind::Runtime)
    }

    /// Whether fetching the report itself spans the measurement window.
    pub fn is_self_timed(&self) -> bool {
        matches!(self, ReportKind::PerfCounters | ReportKind::InterfaceMonitor)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Perfmon => write!(f, "perfmon statistics"),
            ReportKind::Runtime => write!(f, "runtime"),
            ReportKind::Latency => write!(f, "dpdk latency"),
            ReportKind::PerfCounters => write!(f, "performance counters"),
            ReportKind::InterfaceMonitor => write!(f, "interface monitor"),
        }
    }
}

/// Output of one parser invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub kind: ReportKind,
    snapshots: Vec<ThreadSnapshot>,
    /// Data rows that were rejected because their shape did not match the
    /// report schema.
    pub skipped_rows: usize,
}

impl ParsedReport {
    pub fn new(kind: ReportKind) -> Self {
        Self {
            kind,
            snapshots: Vec::new(),
            skipped_rows: 0,
        }
    }

    /// Snapshot for `name`, created at the end if this is its first encounter.
    pub fn snapshot_mut(&mut self, name: &str) -> &mut ThreadSnapshot {
        let index = match self.snapshots.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.snapshots.push(ThreadSnapshot::new(name));
                self.snapshots.len() - 1
            }
        };
        &mut self.snapshots[index]
    }

    pub fn snapshot(&self, name: &str) -> Option<&ThreadSnapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }

    pub fn snapshots(&self) -> &[ThreadSnapshot] {
        &self.snapshots
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.snapshots.iter().map(|s| s.name.as_str()).collect()
    }

    /// True when no scope holds any entity.
    pub fn is_empty(&self) -> bool {
        self.snapshots.iter().all(ThreadSnapshot::is_empty)
    }

    /// Keep only the scopes named in `filter`, preserving report order.
    pub fn retain_scopes<S: AsRef<str>>(&mut self, filter: &[S]) {
        self.snapshots
            .retain(|s| filter.iter().any(|wanted| wanted.as_ref() == s.name));
    }
}

/// Several reports combined by scope and entity.
///
/// Fields are keyed `<namespace>.<field>`; the namespace is the report kind
/// (`perfmon`, `runtime`, ...) and gets a numeric suffix (`runtime_2`) when the
/// same kind is merged more than once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedStats {
    scopes: Vec<ThreadSnapshot>,
    merged_kinds: HashMap<ReportKind, usize>,
    skipped_rows: usize,
}

impl MergedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a report by key union and return the namespace it was stored
    /// under.
    pub fn merge(&mut self, report: &ParsedReport) -> String {
        let count = self.merged_kinds.entry(report.kind).or_insert(0);
        *count += 1;
        let namespace = if *count == 1 {
            report.kind.namespace().to_string()
        } else {
            format!("{}_{}", report.kind.namespace(), count)
        };

        self.skipped_rows += report.skipped_rows;
        for snapshot in report.snapshots() {
            let scope = self.scope_mut(&snapshot.name);
            for (entity, record) in snapshot.entities() {
                let target = scope.entity_mut(entity);
                for (field, value) in record.iter() {
                    let inserted = target.insert(format!("{}.{}", namespace, field), value.cloned());
                    debug_assert!(inserted, "namespaced field collided");
                }
            }
        }
        namespace
    }

    fn scope_mut(&mut self, name: &str) -> &mut ThreadSnapshot {
        let index = match self.scopes.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.scopes.push(ThreadSnapshot::new(name));
                self.scopes.len() - 1
            }
        };
        &mut self.scopes[index]
    }

    pub fn scope(&self, name: &str) -> Option<&ThreadSnapshot> {
        self.scopes.iter().find(|s| s.name == name)
    }

    pub fn scopes(&self) -> &[ThreadSnapshot] {
        &self.scopes
    }

    /// Total rows rejected by the parsers of all merged reports.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(ThreadSnapshot::is_empty)
    }

    /// Nested JSON view: `{scope: {entity: {"<ns>.<field>": value}}}`.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl ThreadSnapshot {
    fn entity_mut(&mut self, entity: &str) -> &mut StatisticRecord {
        let index = match self.entities.iter().position(|(name, _)| name == entity) {
            Some(index) => index,
            None => {
                self.entities.push((entity.to_string(), StatisticRecord::new()));
                self.entities.len() - 1
            }
        };
        &mut self.entities[index].1
    }
}

impl Serialize for MergedStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.scopes.len()))?;
        for scope in &self.scopes {
            map.serialize_entry(&scope.name, scope)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, f64)]) -> StatisticRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), Some(StatValue::Float(*v))))
            .collect()
    }

    #[test]
    fn test_record_keeps_first_value() {
        let mut rec = StatisticRecord::new();
        assert!(rec.insert("calls", Some(StatValue::Int(1))));
        assert!(!rec.insert("calls", Some(StatValue::Int(2))));
        assert_eq!(rec.get("calls"), Some(Some(&StatValue::Int(1))));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_unknown_is_not_zero() {
        let mut rec = StatisticRecord::new();
        rec.insert("icache_hit", None);
        assert_eq!(rec.get("icache_hit"), Some(None));
        assert_eq!(rec.get_f64("icache_hit"), None);
        assert_eq!(rec.get("missing"), None);
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json["icache_hit"].is_null());
    }

    #[test]
    fn test_retain_scopes_preserves_report_order() {
        let mut report = ParsedReport::new(ReportKind::Perfmon);
        report.snapshot_mut("vpp_main");
        report.snapshot_mut("vpp_wk_0");
        report.snapshot_mut("vpp_wk_1");
        report.retain_scopes(&["vpp_wk_1", "vpp_wk_0"]);
        assert_eq!(report.scopes(), vec!["vpp_wk_0", "vpp_wk_1"]);
    }

    #[test]
    fn test_merge_namespaces_fields_by_kind() {
        let mut perfmon = ParsedReport::new(ReportKind::Perfmon);
        perfmon
            .snapshot_mut("vpp_wk_0")
            .insert("ip4-lookup", record(&[("l1i_miss_per_pkt", 0.23)]));
        let mut runtime = ParsedReport::new(ReportKind::Runtime);
        runtime
            .snapshot_mut("vpp_wk_0")
            .insert("ip4-lookup", record(&[("clocks", 41.2)]));

        let mut merged = MergedStats::new();
        assert_eq!(merged.merge(&perfmon), "perfmon");
        assert_eq!(merged.merge(&runtime), "runtime");

        let entity = merged.scope("vpp_wk_0").unwrap().get("ip4-lookup").unwrap();
        assert_eq!(entity.get_f64("perfmon.l1i_miss_per_pkt"), Some(0.23));
        assert_eq!(entity.get_f64("runtime.clocks"), Some(41.2));
    }

    #[test]
    fn test_merge_same_kind_twice_never_overwrites() {
        let mut first = ParsedReport::new(ReportKind::Runtime);
        first
            .snapshot_mut("vpp_wk_0")
            .insert("ip4-lookup", record(&[("clocks", 1.0)]));
        let mut second = ParsedReport::new(ReportKind::Runtime);
        second
            .snapshot_mut("vpp_wk_0")
            .insert("ip4-lookup", record(&[("clocks", 2.0)]));

        let mut merged = MergedStats::new();
        merged.merge(&first);
        assert_eq!(merged.merge(&second), "runtime_2");

        let entity = merged.scope("vpp_wk_0").unwrap().get("ip4-lookup").unwrap();
        assert_eq!(entity.get_f64("runtime.clocks"), Some(1.0));
        assert_eq!(entity.get_f64("runtime_2.clocks"), Some(2.0));
    }

    #[test]
    fn test_merged_json_shape() {
        let mut report = ParsedReport::new(ReportKind::Latency);
        report.skipped_rows = 2;
        report
            .snapshot_mut("Ethernet1")
            .insert("total", record(&[("avg_lat_ns", 812.0)]));
        let mut merged = MergedStats::new();
        merged.merge(&report);

        let json = merged.to_value();
        assert_eq!(json["Ethernet1"]["total"]["latency.avg_lat_ns"], 812.0);
        assert_eq!(merged.skipped_rows(), 2);
    }
}
