//! # Sweep Runner Module
//!
//! This module contains the engine that walks a configuration space, applies
//! each configuration to the router, measures it and hands the measurements
//! to a recorder.
//!
//! ## Key Components
//!
//! - **ExperimentRunner**: Drives the sweep and returns a [`SweepSummary`]
//! - **SweepOptions**: Timing and policy parameters of one sweep
//! - **StatPlan**: Which reports make up one measurement
//!
//! ## Sweep Lifecycle
//!
//! ```text
//! IDLE -> (APPLY -> SETTLE -> MEASURE -> RECORD)* -> IDLE
//! ```
//!
//! 1. **Apply**: Check the configuration against the apply mode, validate
//!    it (optional), restore the swept nodes to the baseline setting
//!    (optional) and apply it. A failure is logged, counted once, and the
//!    configuration is skipped
//! 2. **Settle**: Sleep so the router reaches steady state
//! 3. **Measure**: `repeat_count` iterations of reset, pause, measurement
//!    window and report collection; a failed iteration is dropped
//! 4. **Record**: One record per iteration; sink failures are logged and
//!    the sweep continues
//!
//! ## Cancellation
//!
//! The cancellation flag is checked before each configuration. A sweep that
//! stops early reports `interrupted` in its summary; records already handed
//! to the sink stay written.

use crate::cli::ApplyMode;
use crate::config_space::{ConfigSpace, Configuration};
use crate::control::ControlInterface;
use crate::recorder::{ExperimentRecord, ExperimentRecorder};
use crate::results::{ConfigurationOutcome, SweepSummary};
use crate::stats::{MergedStats, ReportKind};
use crate::utils::{create_progress_indicator, format_duration};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Reports collected for one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatPlan {
    pub reports: Vec<ReportKind>,
    /// Threads kept in threaded reports, and measured by the counter tool.
    /// Empty means every thread (and the whole system for the counter tool).
    pub threads: Vec<String>,
}

impl StatPlan {
    /// Per-node statistics: perfmon, dpdk latency and runtime.
    pub fn vpp_nodes(threads: Vec<String>) -> Self {
        Self {
            reports: vec![ReportKind::Perfmon, ReportKind::Latency, ReportKind::Runtime],
            threads,
        }
    }

    /// Hardware counters of the worker threads.
    pub fn total(threads: Vec<String>) -> Self {
        Self {
            reports: vec![ReportKind::PerfCounters],
            threads,
        }
    }

    /// Hardware counters plus the transmit interface rates.
    pub fn total_with_monitor(threads: Vec<String>) -> Self {
        Self {
            reports: vec![ReportKind::PerfCounters, ReportKind::InterfaceMonitor],
            threads,
        }
    }

    /// The plan's reports measure over the window themselves, so the runner
    /// does not sleep for it.
    pub fn is_self_timed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(ReportKind::is_self_timed)
    }

    fn filter(&self) -> Option<&[String]> {
        if self.threads.is_empty() {
            None
        } else {
            Some(self.threads.as_slice())
        }
    }
}

/// Parameters of one sweep
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Scopes every record and the sink names
    pub experiment_id: String,
    pub apply: ApplyMode,
    pub stats: StatPlan,
    /// Pause between applying a configuration and the first measurement
    pub settle: Duration,
    /// Measurement window
    pub duration: Duration,
    /// Measurements per configuration
    pub repeat_count: usize,
    /// Pause before each measurement
    pub repeat_interval: Duration,
    /// Reset all counters before each measurement
    pub reset_counters: bool,
    /// Check entity names against the router before applying
    pub validate: bool,
    /// Restore every swept node to the baseline setting before applying a
    /// configuration, so no setting carries over from the previous one
    pub baseline_reset: bool,
}

/// Single source of truth for the sweep banner.
struct SweepOptionsDisplay<'a> {
    options: &'a SweepOptions,
    total: usize,
}

impl<'a> fmt::Display for SweepOptionsDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = self.options;
        let reports: Vec<String> = options.stats.reports.iter().map(|k| k.to_string()).collect();
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Sweep:       {}", options.experiment_id)?;
        writeln!(f, "  Configurations:     {}", self.total)?;
        writeln!(f, "  Apply:              {}", options.apply)?;
        if options.baseline_reset && options.apply.applies_nodes() {
            writeln!(f, "  Baseline reset:     on")?;
        }
        writeln!(f, "  Reports:            {}", reports.join(", "))?;
        if !options.stats.threads.is_empty() {
            writeln!(f, "  Threads:            {}", options.stats.threads.join(", "))?;
        }
        writeln!(f, "  Settle:             {}", format_duration(options.settle))?;
        writeln!(f, "  Duration:           {}", format_duration(options.duration))?;
        writeln!(
            f,
            "  Repeats:            {} (interval {})",
            options.repeat_count,
            format_duration(options.repeat_interval)
        )?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Sweep engine.
///
/// ```rust,no_run
/// # use batch_sweep::runner::{ExperimentRunner, StatPlan, SweepOptions};
/// # use batch_sweep::cli::ApplyMode;
/// # use batch_sweep::config_space::UniformSweep;
/// # use batch_sweep::control::{ControlSettings, VppControl};
/// # use batch_sweep::command::CommandTool;
/// # use batch_sweep::recorder::JsonlRecorder;
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let control = VppControl::new(
///     CommandTool::new(["sudo", "vppctl"])?,
///     CommandTool::new(["sudo", "perf"])?,
///     CommandTool::new(["ps"])?,
///     ControlSettings::default(),
/// );
/// let space = UniformSweep::new(vec!["ip4-lookup".into()], vec![32, 64], vec![100])?;
/// let options = SweepOptions {
///     experiment_id: "demo".into(),
///     apply: ApplyMode::NodeBatch,
///     stats: StatPlan::vpp_nodes(vec!["vpp_wk_0".into()]),
///     settle: Duration::ZERO,
///     duration: Duration::from_secs(10),
///     repeat_count: 1,
///     repeat_interval: Duration::ZERO,
///     reset_counters: true,
///     validate: false,
///     baseline_reset: true,
/// };
/// let recorder = JsonlRecorder::new("experiments.jsonl");
/// let summary = ExperimentRunner::new(options).run(&control, &space, &recorder).await;
/// println!("{} records", summary.records_written);
/// # Ok(())
/// # }
/// ```
pub struct ExperimentRunner {
    options: SweepOptions,
    cancel: Arc<AtomicBool>,
}

impl ExperimentRunner {
    pub fn new(options: SweepOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag, typically set from a Ctrl-C handler.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    /// Run the sweep to completion or cancellation.
    ///
    /// Individual configuration failures are counted in the summary, never
    /// returned; the only way this stops early is the cancellation flag.
    pub async fn run(
        &self,
        control: &dyn ControlInterface,
        space: &dyn ConfigSpace,
        recorder: &dyn ExperimentRecorder,
    ) -> SweepSummary {
        let started = Instant::now();
        let total = space.len();
        let mut summary = SweepSummary::new(&self.options.experiment_id);
        let baseline = self.baseline_nodes(space);

        info!(
            "{}",
            SweepOptionsDisplay {
                options: &self.options,
                total,
            }
        );

        for (position, config) in space.configurations().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("Sweep cancelled after {} configurations", summary.configurations_seen);
                summary.interrupted = true;
                break;
            }

            let index = position + 1;
            summary.configurations_seen += 1;
            info!(
                "[{}] {}/{} {}",
                create_progress_indicator(position, total, 20),
                index,
                total,
                config
            );

            let mut outcome = ConfigurationOutcome {
                index,
                configuration: config.clone(),
                applied: false,
                measurements: 0,
                error: None,
            };

            if let Err(e) = self.apply(control, &config, &baseline).await {
                error!("Failed to apply configuration {}: {:#}", index, e);
                summary.apply_failures += 1;
                outcome.error = Some(format!("{:#}", e));
                summary.outcomes.push(outcome);
                continue;
            }
            outcome.applied = true;
            summary.configurations_applied += 1;

            if !self.options.settle.is_zero() {
                debug!("Settling for {}", format_duration(self.options.settle));
                sleep(self.options.settle).await;
            }

            for iteration in 1..=self.options.repeat_count {
                let stats = match self.measure(control).await {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!(
                            "Measurement {}/{} of configuration {} failed: {:#}",
                            iteration, self.options.repeat_count, index, e
                        );
                        summary.measurement_failures += 1;
                        outcome.error.get_or_insert_with(|| format!("{:#}", e));
                        continue;
                    }
                };
                summary.measurements += 1;
                outcome.measurements += 1;
                if stats.skipped_rows() > 0 {
                    debug!("{} report rows skipped", stats.skipped_rows());
                }

                let record = ExperimentRecord::new(&self.options.experiment_id, config.clone(), stats);
                match recorder.record(&record) {
                    Ok(result) => {
                        summary.records_written += 1;
                        summary.schema_conflicts += result.conflicts.len();
                    }
                    Err(e) => {
                        error!("{} recorder failed for configuration {}: {}", recorder.name(), index, e);
                        summary.record_failures += 1;
                        outcome.error.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            summary.outcomes.push(outcome);
        }

        if let Err(e) = recorder.flush() {
            error!("Failed to flush {} recorder: {}", recorder.name(), e);
        }
        summary.elapsed = started.elapsed();
        info!(
            "Sweep {} finished in {}: {} applied, {} failed, {} records",
            summary.experiment_id,
            format_duration(summary.elapsed),
            summary.configurations_applied,
            summary.apply_failures,
            summary.records_written
        );
        summary
    }

    /// Every node the sweep sets, in order of first appearance, when the
    /// baseline reset is on.
    fn baseline_nodes(&self, space: &dyn ConfigSpace) -> Vec<String> {
        if !self.options.baseline_reset || !self.options.apply.applies_nodes() {
            return Vec::new();
        }
        let mut nodes: Vec<String> = Vec::new();
        for config in space.configurations() {
            for name in config.nodes().names() {
                if !nodes.iter().any(|n| n == name) {
                    nodes.push(name.to_string());
                }
            }
        }
        nodes
    }

    async fn apply(
        &self,
        control: &dyn ControlInterface,
        config: &Configuration,
        baseline: &[String],
    ) -> Result<()> {
        self.options.apply.check(config)?;
        if self.options.validate {
            control
                .validate_configuration(config)
                .await
                .context("configuration is not addressable")?;
        }
        if !baseline.is_empty() {
            control
                .reset_batch_config(baseline)
                .await
                .context("baseline reset failed")?;
        }
        match self.options.apply {
            ApplyMode::NodeBatch => control.apply_batch_config(config).await?,
            ApplyMode::InterfaceBatch => control.apply_interface_rate_config(config.interfaces()).await?,
            ApplyMode::NodeAndInterface => {
                control.apply_batch_config(config).await?;
                control.apply_interface_rate_config(config.interfaces()).await?;
            }
        }
        Ok(())
    }

    /// One iteration: reset, pause, window, reports.
    async fn measure(&self, control: &dyn ControlInterface) -> Result<MergedStats> {
        if self.options.reset_counters {
            control.reset_counters().await.context("counter reset failed")?;
        }
        if !self.options.repeat_interval.is_zero() {
            sleep(self.options.repeat_interval).await;
        }
        if !self.options.stats.is_self_timed() && !self.options.duration.is_zero() {
            debug!("Measuring for {}", format_duration(self.options.duration));
            sleep(self.options.duration).await;
        }

        let reports = control
            .fetch_reports(&self.options.stats.reports, self.options.stats.filter())
            .await
            .context("report collection failed")?;
        let mut stats = MergedStats::new();
        for report in &reports {
            stats.merge(report);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_space::{ConfigList, InterfaceBatch, NodeBatch};
    use crate::error::{ControlError, InvocationError, RecordError};
    use crate::recorder::RecordOutcome;
    use crate::stats::{ParsedReport, StatValue, StatisticRecord};
    use crate::config_space::InterfaceBatchMap;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Control stub that fails to apply any configuration naming `broken`.
    #[derive(Default)]
    struct StubControl {
        calls: Mutex<Vec<String>>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl ControlInterface for StubControl {
        async fn reset_counters(&self) -> Result<(), ControlError> {
            self.calls.lock().push("reset".to_string());
            Ok(())
        }

        async fn apply_batch_config(&self, config: &Configuration) -> Result<(), ControlError> {
            self.calls.lock().push(format!("apply {}", config));
            if config.nodes().contains("broken") {
                return Err(InvocationError::NonZeroExit {
                    command: "vppctl set node batch broken".to_string(),
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "unknown node".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn reset_batch_config(&self, nodes: &[String]) -> Result<(), ControlError> {
            self.calls.lock().push(format!("baseline {}", nodes.join(",")));
            Ok(())
        }

        async fn apply_interface_rate_config(
            &self,
            _interfaces: &InterfaceBatchMap,
        ) -> Result<(), ControlError> {
            self.calls.lock().push("apply interface".to_string());
            Ok(())
        }

        async fn fetch_report(
            &self,
            kind: ReportKind,
            _filter: Option<&[String]>,
        ) -> Result<ParsedReport, ControlError> {
            self.calls.lock().push(format!("fetch {}", kind));
            if self.fail_fetch {
                return Err(InvocationError::Timeout {
                    command: "vppctl show runtime".to_string(),
                    timeout: Duration::from_secs(1),
                }
                .into());
            }
            let mut report = ParsedReport::new(kind);
            let record: StatisticRecord = vec![("calls".to_string(), Some(StatValue::Int(1)))]
                .into_iter()
                .collect();
            report.snapshot_mut("vpp_wk_0").insert("ip4-lookup", record);
            Ok(report)
        }

        async fn validate_configuration(&self, _config: &Configuration) -> Result<(), ControlError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[derive(Default)]
    struct MemoryRecorder {
        records: Mutex<Vec<ExperimentRecord>>,
    }

    impl ExperimentRecorder for MemoryRecorder {
        fn record(&self, record: &ExperimentRecord) -> Result<RecordOutcome, RecordError> {
            self.records.lock().push(record.clone());
            Ok(RecordOutcome::default())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn options() -> SweepOptions {
        SweepOptions {
            experiment_id: "e1".to_string(),
            apply: ApplyMode::NodeBatch,
            stats: StatPlan::vpp_nodes(vec!["vpp_wk_0".to_string()]),
            settle: Duration::ZERO,
            duration: Duration::ZERO,
            repeat_count: 1,
            repeat_interval: Duration::ZERO,
            reset_counters: true,
            validate: false,
            baseline_reset: false,
        }
    }

    fn node(name: &str) -> Configuration {
        Configuration::builder()
            .node(name, NodeBatch::new(32, 100))
            .build()
            .unwrap()
    }

    /// Apply fails on configuration 2 of 3; 1 and 3 are still recorded
    #[tokio::test]
    async fn test_partial_failure_continues_sweep() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a"), node("broken"), node("c")]);

        let summary = ExperimentRunner::new(options()).run(&control, &space, &recorder).await;

        assert_eq!(summary.configurations_seen, 3);
        assert_eq!(summary.apply_failures, 1);
        assert_eq!(summary.records_written, 2);
        let recorded: Vec<String> = recorder
            .records
            .lock()
            .iter()
            .map(|r| r.configuration.nodes().names().next().unwrap().to_string())
            .collect();
        assert_eq!(recorded, vec!["a", "c"]);
        assert!(summary.outcomes[1].error.as_deref().unwrap().contains("unknown node"));
        assert!(!summary.outcomes[1].applied);
    }

    #[tokio::test]
    async fn test_repeats_produce_one_record_each() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a")]);
        let mut options = options();
        options.repeat_count = 3;

        let summary = ExperimentRunner::new(options).run(&control, &space, &recorder).await;

        assert_eq!(summary.measurements, 3);
        assert_eq!(recorder.records.lock().len(), 3);
        let calls = control.calls.lock();
        assert_eq!(calls.iter().filter(|c| *c == "reset").count(), 3);
        assert_eq!(calls.iter().filter(|c| c.starts_with("apply")).count(), 1);
        let record = &recorder.records.lock()[0];
        assert!(record.stats.scope("vpp_wk_0").unwrap().get("ip4-lookup").unwrap().contains("runtime.calls"));
    }

    #[tokio::test]
    async fn test_failed_fetch_drops_iteration() {
        let control = StubControl {
            fail_fetch: true,
            ..StubControl::default()
        };
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a"), node("b")]);

        let summary = ExperimentRunner::new(options()).run(&control, &space, &recorder).await;

        assert_eq!(summary.configurations_applied, 2);
        assert_eq!(summary.measurement_failures, 2);
        assert_eq!(summary.records_written, 0);
        assert!(recorder.records.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_configuration() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a"), node("b")]);
        let cancel = Arc::new(AtomicBool::new(true));

        let summary = ExperimentRunner::new(options())
            .with_cancellation(cancel)
            .run(&control, &space, &recorder)
            .await;

        assert!(summary.interrupted);
        assert_eq!(summary.configurations_seen, 0);
        assert!(control.calls.lock().is_empty());
    }

    /// Every swept node returns to the baseline before each apply.
    #[tokio::test]
    async fn test_baseline_reset_precedes_every_apply() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a"), node("b"), node("a")]);
        let mut options = options();
        options.baseline_reset = true;
        options.stats.reports.clear();

        ExperimentRunner::new(options).run(&control, &space, &recorder).await;

        let applies: Vec<String> = control
            .calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("baseline") || c.starts_with("apply"))
            .cloned()
            .collect();
        assert_eq!(applies.len(), 6);
        for pair in applies.chunks(2) {
            assert_eq!(pair[0], "baseline a,b");
            assert!(pair[1].starts_with("apply"));
        }
    }

    #[tokio::test]
    async fn test_baseline_reset_skipped_for_interface_only_sweeps() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let config = Configuration::builder()
            .interface("Ethernet0", InterfaceBatch { size: 32, timeout: 0.0001 })
            .build()
            .unwrap();
        let space = ConfigList::new(vec![config]);
        let mut options = options();
        options.apply = ApplyMode::InterfaceBatch;
        options.baseline_reset = true;

        let summary = ExperimentRunner::new(options).run(&control, &space, &recorder).await;

        assert_eq!(summary.configurations_applied, 1);
        assert!(!control.calls.lock().iter().any(|c| c.starts_with("baseline")));
    }

    /// Settings the apply mode would not send are an apply failure, not a
    /// silent measurement of the previous setting.
    #[tokio::test]
    async fn test_unapplied_settings_fail_the_configuration() {
        let control = StubControl::default();
        let recorder = MemoryRecorder::default();
        let space = ConfigList::new(vec![node("a")]);
        let mut options = options();
        options.apply = ApplyMode::InterfaceBatch;

        let summary = ExperimentRunner::new(options).run(&control, &space, &recorder).await;

        assert_eq!(summary.apply_failures, 1);
        assert_eq!(summary.records_written, 0);
        assert!(control.calls.lock().is_empty());
        assert!(summary.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("does not apply node settings"));
    }

    #[test]
    fn test_stat_plan_timing() {
        assert!(!StatPlan::vpp_nodes(vec![]).is_self_timed());
        assert!(StatPlan::total(vec![]).is_self_timed());
        assert!(StatPlan::total_with_monitor(vec![]).is_self_timed());
        assert_eq!(StatPlan::total(vec![]).filter(), None);
    }
}
