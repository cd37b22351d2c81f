//! # Router Control Interface
//!
//! Semantic operations on the router and the counter tool, built on
//! [`CommandTool`]. The [`ControlInterface`] trait is the seam the sweep
//! runner depends on; [`VppControl`] is the implementation that talks to a
//! live router through `vppctl`, `perf` and `ps`.
//!
//! ## Commands
//!
//! | Operation | Router CLI |
//! |---|---|
//! | reset counters | `perfmon stop`, `perfmon reset`, `clear runtime`, `dpdk latency reset`, `perfmon start bundle <b>` |
//! | node batching | `set node batch <node> size <n> timeout <us> …` |
//! | baseline | `set node batch <node> size 256 timeout 0 …` |
//! | interface batching | `set dpdk batchsize <if> batchsize <n> timeout <s>` |
//! | reports | `show perfmon statistics`, `show runtime`, `show dpdk latency`, `monitor interface …` |
//! | validation | `show vlib graph`, `show interface` |
//!
//! Counter and interface monitor reports of the same measurement share one
//! window: the counter tool runs the monitor command as its workload.
//!
//! Parsers never fail: an unrecognized report is an empty report. Invocation
//! failures propagate unchanged.

use crate::command::{CommandOutput, CommandTool, InvokeOptions};
use crate::config_space::{Configuration, InterfaceBatchMap, NodeBatch};
use crate::error::{ConfigurationError, ControlError};
use crate::parsers::{self, find_pids, parse_process_table, PerfmonSchema, RuntimeSchema};
use crate::stats::{ParsedReport, ReportKind};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Operations the sweep needs from the system under test.
#[async_trait]
pub trait ControlInterface: Send + Sync {
    /// Zero every statistic source so the next report covers only the
    /// coming measurement window.
    async fn reset_counters(&self) -> Result<(), ControlError>;

    /// Apply the node batch settings of `config` in one command. A
    /// configuration without node entries is rejected.
    async fn apply_batch_config(&self, config: &Configuration) -> Result<(), ControlError>;

    /// Restore `nodes` to the baseline batch setting
    /// ([`BASELINE_BATCH`](crate::defaults::BASELINE_BATCH)).
    async fn reset_batch_config(&self, nodes: &[String]) -> Result<(), ControlError>;

    /// Apply the batch setting of exactly one receive interface.
    async fn apply_interface_rate_config(
        &self,
        interfaces: &InterfaceBatchMap,
    ) -> Result<(), ControlError>;

    /// Run and parse one report. For threaded reports `filter` restricts the
    /// result to the named threads; for counter reports it names the
    /// threads to measure.
    async fn fetch_report(
        &self,
        kind: ReportKind,
        filter: Option<&[String]>,
    ) -> Result<ParsedReport, ControlError>;

    /// Run and parse the reports of one measurement, in order.
    async fn fetch_reports(
        &self,
        kinds: &[ReportKind],
        filter: Option<&[String]>,
    ) -> Result<Vec<ParsedReport>, ControlError> {
        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            reports.push(self.fetch_report(*kind, filter).await?);
        }
        Ok(reports)
    }

    /// Check that every entity of `config` exists on the target.
    async fn validate_configuration(&self, config: &Configuration) -> Result<(), ControlError>;

    fn name(&self) -> &'static str;
}

/// How the perfmon table columns are determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerfmonColumns {
    /// Always use this schema.
    Fixed(PerfmonSchema),
    /// Read the report's column header, falling back to this schema.
    Infer(PerfmonSchema),
}

/// Tunables of [`VppControl`].
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Bundle restarted after every reset; `None` leaves perfmon stopped.
    pub perfmon_bundle: Option<String>,
    pub perfmon_columns: PerfmonColumns,
    pub runtime_schema: RuntimeSchema,
    /// Events passed to `perf stat -e`.
    pub perf_events: Vec<String>,
    /// Window covered by self-timed reports (counter tool, interface
    /// monitor).
    pub measurement: Duration,
    /// Interface sampled by the interface monitor.
    pub monitor_interface: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            perfmon_bundle: Some(crate::defaults::PERFMON_BUNDLE.to_string()),
            perfmon_columns: PerfmonColumns::Infer(PerfmonSchema::cache_detail()),
            runtime_schema: RuntimeSchema::batching(),
            perf_events: parsers::DEFAULT_PERF_EVENTS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            measurement: crate::defaults::DURATION,
            monitor_interface: crate::defaults::TX_INTERFACE.to_string(),
        }
    }
}

/// Control of a live router.
pub struct VppControl {
    vppctl: CommandTool,
    perf: CommandTool,
    ps: CommandTool,
    settings: ControlSettings,
}

/// Seconds as the router and `sleep` accept them: integral when possible.
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{}", duration.as_secs_f64())
    }
}

/// Arguments of `set node batch`; purely numeric names address nodes by
/// index.
fn batch_args<'a>(nodes: impl IntoIterator<Item = (&'a str, &'a NodeBatch)>) -> Vec<String> {
    let mut args = vec!["set".to_string(), "node".to_string(), "batch".to_string()];
    for (name, batch) in nodes {
        if name.parse::<u32>().is_ok() {
            args.push("index".to_string());
        }
        args.push(name.to_string());
        if let Some(size) = batch.size {
            args.push("size".to_string());
            args.push(size.to_string());
        }
        if let Some(timeout) = batch.timeout {
            args.push("timeout".to_string());
            args.push(timeout.to_string());
        }
    }
    args
}

fn node_batch_args(config: &Configuration) -> Vec<String> {
    batch_args(config.nodes().iter())
}

fn baseline_batch_args(nodes: &[String]) -> Vec<String> {
    let (size, timeout) = crate::defaults::BASELINE_BATCH;
    let baseline = NodeBatch::new(size, timeout);
    batch_args(nodes.iter().map(|name| (name.as_str(), &baseline)))
}

/// Keep the threads a threaded report was asked for and log what the
/// report looks like.
fn finish_report(kind: ReportKind, mut report: ParsedReport, filter: Option<&[String]>) -> ParsedReport {
    if let (Some(threads), true) = (filter, kind.is_threaded()) {
        report.retain_scopes(threads);
    }
    if report.is_empty() {
        warn!("{} report is empty", kind);
    }
    if report.skipped_rows > 0 {
        debug!("{} report: {} rows skipped", kind, report.skipped_rows);
    }
    report
}

fn interface_batch_args(interfaces: &InterfaceBatchMap) -> Result<Vec<String>, ConfigurationError> {
    let mut entries = interfaces.iter();
    let (interface, batch) = match (entries.next(), interfaces.len()) {
        (Some(entry), 1) => entry,
        (_, count) => return Err(ConfigurationError::InterfaceCount(count)),
    };
    Ok(vec![
        "set".to_string(),
        "dpdk".to_string(),
        "batchsize".to_string(),
        interface.to_string(),
        "batchsize".to_string(),
        batch.size.to_string(),
        "timeout".to_string(),
        batch.timeout.to_string(),
    ])
}

impl VppControl {
    pub fn new(vppctl: CommandTool, perf: CommandTool, ps: CommandTool, settings: ControlSettings) -> Self {
        Self {
            vppctl,
            perf,
            ps,
            settings,
        }
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    async fn vppctl_text(&self, args: &[&str]) -> Result<String, ControlError> {
        Ok(self.vppctl.output_text(args).await?)
    }

    /// Run the counter tool around `workload` and return the scope label
    /// with the tool's output.
    async fn run_counters(
        &self,
        threads: &[String],
        workload: Vec<String>,
    ) -> Result<(String, CommandOutput), ControlError> {
        let mut args = vec!["stat".to_string(), "-e".to_string(), self.settings.perf_events.join(",")];
        let scope = if threads.is_empty() {
            args.push("-a".to_string());
            "system".to_string()
        } else {
            let table = self.ps.output_text(&["-eLo", "pid,comm"]).await?;
            let pids = find_pids(&parse_process_table(&table), threads);
            if pids.is_empty() {
                return Err(ControlError::ProcessNotFound(threads.to_vec()));
            }
            args.push("-p".to_string());
            args.push(pids.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(","));
            threads.join("+")
        };
        args.push("--".to_string());
        args.extend(workload);

        let output = self.perf.invoke(&args).await?;
        Ok((scope, output))
    }

    async fn counter_report(&self, threads: &[String]) -> Result<ParsedReport, ControlError> {
        let window = vec!["sleep".to_string(), format_seconds(self.settings.measurement)];
        let (scope, output) = self.run_counters(threads, window).await?;
        Ok(parsers::parse_perf_stat(&output.stderr_text(), &scope))
    }

    fn monitor_args(&self) -> Vec<String> {
        let interval = format_seconds(self.settings.measurement);
        [
            "monitor",
            "interface",
            self.settings.monitor_interface.as_str(),
            "interval",
            interval.as_str(),
            "count",
            "1",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect()
    }

    async fn monitor_report(&self) -> Result<ParsedReport, ControlError> {
        let args = self.monitor_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let text = self.vppctl_text(&args).await?;
        Ok(parsers::parse_interface_monitor(&text, &self.settings.monitor_interface))
    }

    /// Counters and interface rates over one window. The counter summary is
    /// on stderr, the monitor line on stdout.
    async fn counter_and_monitor_report(
        &self,
        threads: &[String],
    ) -> Result<(ParsedReport, ParsedReport), ControlError> {
        let mut workload = self.vppctl.command().to_vec();
        workload.extend(self.monitor_args());
        let (scope, output) = self.run_counters(threads, workload).await?;
        Ok((
            parsers::parse_perf_stat(&output.stderr_text(), &scope),
            parsers::parse_interface_monitor(&output.stdout_text(), &self.settings.monitor_interface),
        ))
    }
}

#[async_trait]
impl ControlInterface for VppControl {
    async fn reset_counters(&self) -> Result<(), ControlError> {
        // Stopping an idle perfmon session fails; that is expected here.
        let stop = self
            .vppctl
            .invoke_with(&["perfmon", "stop"], InvokeOptions::lenient())
            .await?;
        if !stop.success() {
            debug!("perfmon stop: {}", stop.stdout_text().trim());
        }
        self.vppctl.invoke(&["perfmon", "reset"]).await?;
        self.vppctl.invoke(&["clear", "runtime"]).await?;
        self.vppctl.invoke(&["dpdk", "latency", "reset"]).await?;
        if let Some(bundle) = &self.settings.perfmon_bundle {
            self.vppctl.invoke(&["perfmon", "start", "bundle", bundle]).await?;
        }
        Ok(())
    }

    async fn apply_batch_config(&self, config: &Configuration) -> Result<(), ControlError> {
        if config.nodes().is_empty() {
            return Err(ConfigurationError::NothingToApply("node").into());
        }
        self.vppctl.invoke(&node_batch_args(config)).await?;
        Ok(())
    }

    async fn reset_batch_config(&self, nodes: &[String]) -> Result<(), ControlError> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.vppctl.invoke(&baseline_batch_args(nodes)).await?;
        Ok(())
    }

    async fn apply_interface_rate_config(
        &self,
        interfaces: &InterfaceBatchMap,
    ) -> Result<(), ControlError> {
        let args = interface_batch_args(interfaces)?;
        self.vppctl.invoke(&args).await?;
        Ok(())
    }

    async fn fetch_report(
        &self,
        kind: ReportKind,
        filter: Option<&[String]>,
    ) -> Result<ParsedReport, ControlError> {
        let report = match kind {
            ReportKind::Perfmon => {
                let text = self.vppctl_text(&["show", "perfmon", "statistics"]).await?;
                match &self.settings.perfmon_columns {
                    PerfmonColumns::Fixed(schema) => parsers::parse_perfmon(&text, schema),
                    PerfmonColumns::Infer(fallback) => parsers::parse_perfmon_inferred(&text, fallback),
                }
            }
            ReportKind::Runtime => {
                let text = self.vppctl_text(&["show", "runtime"]).await?;
                parsers::parse_runtime(&text, &self.settings.runtime_schema)
            }
            ReportKind::Latency => {
                let text = self.vppctl_text(&["show", "dpdk", "latency"]).await?;
                parsers::parse_latency(&text)
            }
            ReportKind::PerfCounters => self.counter_report(filter.unwrap_or(&[])).await?,
            ReportKind::InterfaceMonitor => self.monitor_report().await?,
        };
        Ok(finish_report(kind, report, filter))
    }

    async fn fetch_reports(
        &self,
        kinds: &[ReportKind],
        filter: Option<&[String]>,
    ) -> Result<Vec<ParsedReport>, ControlError> {
        let (mut counters, mut monitor) = if kinds.contains(&ReportKind::PerfCounters)
            && kinds.contains(&ReportKind::InterfaceMonitor)
        {
            let (counters, monitor) = self.counter_and_monitor_report(filter.unwrap_or(&[])).await?;
            (Some(counters), Some(monitor))
        } else {
            (None, None)
        };

        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let shared = match kind {
                ReportKind::PerfCounters => counters.take(),
                ReportKind::InterfaceMonitor => monitor.take(),
                _ => None,
            };
            let report = match shared {
                Some(report) => finish_report(*kind, report, filter),
                None => self.fetch_report(*kind, filter).await?,
            };
            reports.push(report);
        }
        Ok(reports)
    }

    async fn validate_configuration(&self, config: &Configuration) -> Result<(), ControlError> {
        let named_nodes: Vec<&str> = config
            .nodes()
            .names()
            .filter(|n| n.parse::<u32>().is_err())
            .collect();
        if !named_nodes.is_empty() {
            let text = self.vppctl_text(&["show", "vlib", "graph"]).await?;
            let known = parsers::parse_graph_node_names(&text);
            if let Some(unknown) = named_nodes.iter().find(|n| !known.iter().any(|k| k == *n)) {
                return Err(ConfigurationError::UnknownEntity(unknown.to_string()).into());
            }
        }

        if !config.interfaces().is_empty() {
            let text = self.vppctl_text(&["show", "interface"]).await?;
            let known = parsers::parse_interface_names(&text);
            if let Some(unknown) = config.interfaces().names().find(|n| !known.iter().any(|k| k == n)) {
                return Err(ConfigurationError::UnknownEntity(unknown.to_string()).into());
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "vppctl"
    }
}
