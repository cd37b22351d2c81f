//! # Experiment Recorders
//!
//! Sinks that persist one [`ExperimentRecord`] per measurement. Every sink
//! implements [`ExperimentRecorder`]; the sweep runner holds a single
//! `Box<dyn ExperimentRecorder>` built by [`RecorderFactory`].
//!
//! ## Record Shape
//!
//! A record is flattened into dotted keys before it is stored:
//!
//! ```text
//! experiment_id                                   "20240105143012"
//! create_time                                     "2024-01-05T14:30:22Z"
//! setting.dispatcher.num                          8
//! setting.nodes.ip4-lookup.size                   64
//! stat.vpp_wk_0.dpdk-input.perfmon.l1i_miss_per_pkt   13.88
//! ```
//!
//! ## Sinks
//!
//! - [`TableRecorder`]: one SQLite table per experiment, columns added as new
//!   keys appear
//! - [`JsonlRecorder`]: one JSON object per line
//! - [`FanoutRecorder`]: writes to several sinks in turn
//!
//! Storage is scoped by the experiment id through `{experiment_id}` in the
//! path templates; a sink refuses records from a second experiment.

pub mod jsonl;
pub mod table;

pub use jsonl::JsonlRecorder;
pub use table::TableRecorder;

use crate::config_space::Configuration;
use crate::error::{RecordError, SchemaConflict};
use crate::stats::MergedStats;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

/// Placeholder replaced by the experiment id in sink path templates.
pub const EXPERIMENT_ID_PLACEHOLDER: &str = "{experiment_id}";

/// One measurement of one configuration.
#[derive(Debug, Clone)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub configuration: Configuration,
    pub stats: MergedStats,
    pub timestamp: DateTime<Utc>,
}

impl ExperimentRecord {
    pub fn new(experiment_id: impl Into<String>, configuration: Configuration, stats: MergedStats) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            configuration,
            stats,
            timestamp: Utc::now(),
        }
    }

    pub fn create_time(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// `setting.*` and `stat.*` fields as dotted keys, settings first.
    pub fn fields(&self) -> Vec<(String, Value)> {
        let mut fields = Vec::new();
        let setting = serde_json::to_value(&self.configuration).unwrap_or(Value::Null);
        flatten_into("setting", setting, &mut fields);
        flatten_into("stat", self.stats.to_value(), &mut fields);
        fields
    }
}

fn flatten_into(prefix: &str, value: Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{}.{}", prefix, key), nested, out);
            }
        }
        other => out.push((prefix.to_string(), other)),
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Fields whose value disagreed with the stored column type.
    pub conflicts: Vec<SchemaConflict>,
}

/// A persistence sink for experiment records.
pub trait ExperimentRecorder: Send + Sync {
    fn record(&self, record: &ExperimentRecord) -> Result<RecordOutcome, RecordError>;

    fn name(&self) -> &'static str;

    /// Push buffered records to storage.
    fn flush(&self) -> Result<(), RecordError> {
        Ok(())
    }
}

/// Writes every record to each inner sink in order.
///
/// A failing sink does not stop the others; the first error is returned
/// after all sinks were tried.
pub struct FanoutRecorder {
    sinks: Vec<Box<dyn ExperimentRecorder>>,
}

impl FanoutRecorder {
    pub fn new(sinks: Vec<Box<dyn ExperimentRecorder>>) -> Self {
        Self { sinks }
    }
}

impl ExperimentRecorder for FanoutRecorder {
    fn record(&self, record: &ExperimentRecord) -> Result<RecordOutcome, RecordError> {
        let mut outcome = RecordOutcome::default();
        let mut first_error = None;
        for sink in &self.sinks {
            match sink.record(record) {
                Ok(mut result) => outcome.conflicts.append(&mut result.conflicts),
                Err(e) => {
                    warn!("{} recorder failed: {}", sink.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn name(&self) -> &'static str {
        "fanout"
    }

    fn flush(&self) -> Result<(), RecordError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                warn!("{} recorder flush failed: {}", sink.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Sink locations; `{experiment_id}` is substituted on the first record.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub table_path: String,
    pub table_name: String,
    pub jsonl_path: String,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            table_path: crate::defaults::TABLE_PATH.to_string(),
            table_name: crate::defaults::TABLE_NAME.to_string(),
            jsonl_path: crate::defaults::JSONL_PATH.to_string(),
        }
    }
}

/// Substitute the experiment id into a sink template.
pub fn expand_template(template: &str, experiment_id: &str) -> String {
    template.replace(EXPERIMENT_ID_PLACEHOLDER, experiment_id)
}

pub struct RecorderFactory;

impl RecorderFactory {
    /// Create the sink selected on the command line.
    pub fn create(
        sink: &crate::cli::RecordSink,
        options: &RecorderOptions,
    ) -> Result<Box<dyn ExperimentRecorder>> {
        use crate::cli::RecordSink;

        match sink {
            RecordSink::Table => Ok(Box::new(TableRecorder::new(
                &options.table_path,
                &options.table_name,
            ))),
            RecordSink::Jsonl => Ok(Box::new(JsonlRecorder::new(&options.jsonl_path))),
            RecordSink::Both => Ok(Box::new(FanoutRecorder::new(vec![
                Self::create(&RecordSink::Table, options)?,
                Self::create(&RecordSink::Jsonl, options)?,
            ]))),
        }
    }
}

/// Parent directory of a sink path must exist before the sink is used.
pub(crate) fn ensure_parent(path: &str) -> std::io::Result<()> {
    match PathBuf::from(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
