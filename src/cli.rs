use crate::config_space::{
    load_configurations, Comparison, ConfigSpace, Configuration, ConstrainedPair, FullCombination,
    InterfaceSweep, NodeBatch, Product, UniformSweep, Zip,
};
use crate::control::{ControlSettings, PerfmonColumns};
use crate::error::ConfigurationError;
use crate::parsers::{PerfmonSchema, RuntimeSchema};
use crate::recorder::RecorderOptions;
use crate::runner::{StatPlan, SweepOptions};
use crate::utils::{
    generate_experiment_id, validate_batch_size, validate_entity_name, validate_repeat_count,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Batch Sweep - apply batch/timeout configurations to VPP and record the
/// resulting node, cache and interface statistics
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Configuration space to sweep
    #[clap(long, value_enum, default_value_t = SettingsMode::NodeBatch, help_heading = "Core Options")]
    pub settings: SettingsMode,

    /// How each configuration is applied to the router (default: follows --settings)
    #[clap(long, value_enum, help_heading = "Core Options")]
    pub apply: Option<ApplyMode>,

    /// Statistics collected per measurement
    #[clap(long, value_enum, default_value_t = StatsMode::VppNodes, help_heading = "Core Options")]
    pub stats: StatsMode,

    /// Where measurements are recorded
    #[clap(long, value_enum, default_value_t = RecordSink::Table, help_heading = "Core Options")]
    pub record: RecordSink,

    /// Experiment id (default: local time as %Y%m%d%H%M%S)
    #[clap(long, help_heading = "Core Options")]
    pub experiment_id: Option<String>,

    /// Graph nodes swept by the node settings
    #[clap(long, value_delimiter = ',', default_values_t = crate::defaults::BATCH_NODES.map(String::from), help_heading = "Node Settings")]
    pub nodes: Vec<String>,

    /// Node batch sizes
    #[clap(long, value_delimiter = ',', default_values_t = crate::defaults::BATCH_SIZES.to_vec(), help_heading = "Node Settings")]
    pub sizes: Vec<u32>,

    /// Node batch timeouts in microseconds
    #[clap(long, value_delimiter = ',', default_values_t = crate::defaults::BATCH_TIMEOUTS.to_vec(), help_heading = "Node Settings")]
    pub timeouts: Vec<u64>,

    /// Node groups of the grouped settings, separated by `;`; each group
    /// shares one size/timeout per configuration
    #[clap(long, value_delimiter = ';', default_values_t = crate::defaults::NODE_GROUPS.map(|g| g.join(",")), help_heading = "Node Settings")]
    pub node_groups: Vec<String>,

    /// Upper bound on the number of full-combination configurations
    #[clap(long, default_value_t = crate::defaults::MAX_COMBINATIONS, help_heading = "Node Settings")]
    pub max_combinations: usize,

    /// Receive interface whose batching is swept
    #[clap(long, default_value = crate::defaults::RX_INTERFACE, help_heading = "Interface Settings")]
    pub rx_interface: String,

    /// Transmit interface sampled by the interface monitor
    #[clap(long, default_value = crate::defaults::TX_INTERFACE, help_heading = "Interface Settings")]
    pub tx_interface: String,

    /// Interface batch sizes (default: the node batch sizes)
    #[clap(long, value_delimiter = ',', help_heading = "Interface Settings")]
    pub interface_sizes: Option<Vec<u32>>,

    /// Interface batch timeouts in seconds (default: the node timeouts converted from microseconds)
    #[clap(long, value_delimiter = ',', help_heading = "Interface Settings")]
    pub interface_timeouts: Option<Vec<f64>>,

    /// Primary entity of the constrained settings
    #[clap(long, default_value = crate::defaults::CONSTRAINED_PRIMARY, help_heading = "Constrained Settings")]
    pub primary: String,

    /// Primary batch sizes (default: 16 to 256 in steps of 16)
    #[clap(long, value_delimiter = ',', help_heading = "Constrained Settings")]
    pub primary_sizes: Option<Vec<u32>>,

    /// Secondary entities (default: protocol1 to protocol16)
    #[clap(long, value_delimiter = ',', help_heading = "Constrained Settings")]
    pub secondaries: Option<Vec<String>>,

    /// Secondary batch sizes
    #[clap(long, value_delimiter = ',', default_values_t = crate::defaults::SECONDARY_SIZES.to_vec(), help_heading = "Constrained Settings")]
    pub secondary_sizes: Vec<u32>,

    /// Worker thread count, also emitted as the dispatcher setting
    #[clap(long, default_value_t = crate::defaults::WORKERS, help_heading = "Constrained Settings")]
    pub workers: u32,

    /// Timeout in microseconds for primary and secondary entities
    #[clap(long, default_value_t = crate::defaults::CONSTRAINED_TIMEOUT, help_heading = "Constrained Settings")]
    pub constrained_timeout: u64,

    /// Extra entities with a fixed setting, as name:size:timeout
    #[clap(long, value_delimiter = ',', value_parser = parse_fixed_entry, default_values_t = vec![FixedEntry::default_extra()], help_heading = "Constrained Settings")]
    pub fixed: Vec<FixedEntry>,

    /// JSON Lines configuration file for `--settings file`
    #[clap(long, help_heading = "Core Options")]
    pub settings_file: Option<PathBuf>,

    /// Shuffle the configurations with this seed
    #[clap(long, help_heading = "Core Options")]
    pub shuffle: Option<u64>,

    /// Write the generated configurations to this file and exit
    #[clap(long, help_heading = "Core Options")]
    pub emit_configs: Option<PathBuf>,

    /// Pause after applying a configuration
    #[clap(long, value_parser = parse_duration, default_value = "0s", help_heading = "Timing")]
    pub settle: Duration,

    /// Measurement window
    #[clap(short = 'd', long, value_parser = parse_duration, default_value = crate::defaults::DURATION_ARG, help_heading = "Timing")]
    pub duration: Duration,

    /// Measurements per configuration
    #[clap(long, default_value_t = crate::defaults::REPEAT_COUNT, help_heading = "Timing")]
    pub repeat_count: usize,

    /// Pause before each measurement
    #[clap(long, value_parser = parse_duration, default_value = "0s", help_heading = "Timing")]
    pub repeat_interval: Duration,

    /// Do not reset counters before each measurement
    #[clap(long, default_value_t = false, help_heading = "Timing")]
    pub no_reset: bool,

    /// Do not restore the swept nodes to full batches before each configuration
    #[clap(long, default_value_t = false, help_heading = "Timing")]
    pub no_baseline_reset: bool,

    /// Check every entity against the router before applying
    #[clap(long, default_value_t = false, help_heading = "Timing")]
    pub validate: bool,

    /// Worker threads kept in the reports and measured by the counter tool
    #[clap(long, value_delimiter = ',', default_values_t = crate::defaults::THREADS.map(String::from), help_heading = "Statistics")]
    pub threads: Vec<String>,

    /// Column layout of `show perfmon statistics`
    #[clap(long, value_enum, default_value_t = PerfmonSchemaArg::Auto, help_heading = "Statistics")]
    pub perfmon_schema: PerfmonSchemaArg,

    /// Perfmon bundle started after each reset (empty to leave perfmon stopped)
    #[clap(long, default_value = crate::defaults::PERFMON_BUNDLE, help_heading = "Statistics")]
    pub perfmon_bundle: String,

    /// Column layout of `show runtime`
    #[clap(long, value_enum, default_value_t = RuntimeColumns::Batching, help_heading = "Statistics")]
    pub runtime_columns: RuntimeColumns,

    /// Events passed to the counter tool
    #[clap(long, value_delimiter = ',', default_values_t = crate::parsers::DEFAULT_PERF_EVENTS.map(String::from), help_heading = "Statistics")]
    pub perf_events: Vec<String>,

    /// Router CLI command
    #[clap(long, default_value = crate::defaults::VPPCTL_COMMAND, help_heading = "Tools")]
    pub vppctl: String,

    /// Counter tool command
    #[clap(long, default_value = crate::defaults::PERF_COMMAND, help_heading = "Tools")]
    pub perf: String,

    /// Process table command
    #[clap(long, default_value = crate::defaults::PS_COMMAND, help_heading = "Tools")]
    pub ps: String,

    /// Kill any tool invocation that runs longer than this
    #[clap(long, value_parser = parse_duration, help_heading = "Tools")]
    pub command_timeout: Option<Duration>,

    /// SQLite database path template
    #[clap(long, default_value = crate::defaults::TABLE_PATH, help_heading = "Output")]
    pub table_path: String,

    /// SQLite table name template
    #[clap(long, default_value = crate::defaults::TABLE_NAME, help_heading = "Output")]
    pub table_name: String,

    /// JSON Lines path template
    #[clap(long, default_value = crate::defaults::JSONL_PATH, help_heading = "Output")]
    pub jsonl_path: String,

    /// Output file for the sweep summary (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE, help_heading = "Output")]
    pub output_file: PathBuf,

    /// Verbose output (-v debug, -vv also echoes tool output)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

/// Configuration spaces selectable with `--settings`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum SettingsMode {
    /// Every node shares one size/timeout per configuration
    NodeBatch,
    /// Every node independently takes every size/timeout
    NodeCombinations,
    /// The receive interface alone
    InterfaceBatch,
    /// Node batch settings paired one to one with interface settings
    NodeAndInterface,
    /// Node combinations crossed with interface settings
    NodeAndInterfaceCombinations,
    /// Every node group independently, crossed with interface settings
    GroupedCombinations,
    /// Primary size equal to secondary size times workers
    ConstrainedEqual,
    /// Primary size below secondary size times workers
    ConstrainedLess,
    /// Primary size above secondary size times workers
    ConstrainedGreater,
    /// Configurations read from `--settings-file`
    File,
}

impl SettingsMode {
    /// Apply mode covering every entity kind the settings produce. File
    /// settings are assumed to hold node settings.
    pub fn default_apply(&self) -> ApplyMode {
        match self {
            SettingsMode::InterfaceBatch => ApplyMode::InterfaceBatch,
            SettingsMode::NodeAndInterface
            | SettingsMode::NodeAndInterfaceCombinations
            | SettingsMode::GroupedCombinations => ApplyMode::NodeAndInterface,
            _ => ApplyMode::NodeBatch,
        }
    }
}

/// Ways to apply a configuration, selectable with `--apply`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ApplyMode {
    NodeBatch,
    InterfaceBatch,
    NodeAndInterface,
}

impl ApplyMode {
    pub fn applies_nodes(&self) -> bool {
        matches!(self, ApplyMode::NodeBatch | ApplyMode::NodeAndInterface)
    }

    pub fn applies_interfaces(&self) -> bool {
        matches!(self, ApplyMode::InterfaceBatch | ApplyMode::NodeAndInterface)
    }

    /// Check that this mode applies every setting of `config` and has
    /// something to apply for each kind it covers.
    pub fn check(&self, config: &Configuration) -> Result<(), ConfigurationError> {
        let kinds = [
            ("node", !config.nodes().is_empty(), self.applies_nodes()),
            ("interface", !config.interfaces().is_empty(), self.applies_interfaces()),
        ];
        for (kind, present, applied) in kinds {
            match (present, applied) {
                (true, false) => {
                    return Err(ConfigurationError::UnappliedKind {
                        apply: self.to_string(),
                        kind,
                    })
                }
                (false, true) => return Err(ConfigurationError::NothingToApply(kind)),
                _ => {}
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyMode::NodeBatch => write!(f, "Node Batch"),
            ApplyMode::InterfaceBatch => write!(f, "Interface Batch"),
            ApplyMode::NodeAndInterface => write!(f, "Node and Interface Batch"),
        }
    }
}

/// Statistic sets selectable with `--stats`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum StatsMode {
    /// perfmon, dpdk latency and runtime per node
    VppNodes,
    /// Hardware counters of the worker threads
    Total,
    /// Hardware counters plus transmit interface rates
    TotalWithMonitor,
}

/// Recorder sinks selectable with `--record`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum RecordSink {
    Table,
    Jsonl,
    Both,
}

impl std::fmt::Display for RecordSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSink::Table => write!(f, "SQLite Table"),
            RecordSink::Jsonl => write!(f, "JSON Lines"),
            RecordSink::Both => write!(f, "SQLite Table and JSON Lines"),
        }
    }
}

/// Perfmon column layouts selectable with `--perfmon-schema`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum PerfmonSchemaArg {
    /// Read the report header, falling back to cache-detail
    Auto,
    CacheDetail,
    CacheHierarchy,
}

/// Runtime column layouts selectable with `--runtime-columns`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum RuntimeColumns {
    /// Batching build with dispatch counters
    Batching,
    /// Unmodified router build
    Stock,
}

/// An entity pinned to one setting in every constrained configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedEntry {
    pub name: String,
    pub batch: NodeBatch,
}

impl FixedEntry {
    fn default_extra() -> Self {
        Self {
            name: crate::defaults::CONSTRAINED_FIXED.0.to_string(),
            batch: NodeBatch::new(
                crate::defaults::CONSTRAINED_FIXED.1,
                crate::defaults::CONSTRAINED_FIXED.2,
            ),
        }
    }
}

impl std::fmt::Display for FixedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.name)?;
        if let Some(size) = self.batch.size {
            write!(f, "{}", size)?;
        }
        write!(f, ":")?;
        if let Some(timeout) = self.batch.timeout {
            write!(f, "{}", timeout)?;
        }
        Ok(())
    }
}

impl FromStr for FixedEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_entry(s)
    }
}

/// Parse `name:size:timeout`; size and timeout may be left empty.
fn parse_fixed_entry(s: &str) -> Result<FixedEntry, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [name, size, timeout] = parts.as_slice() else {
        return Err(format!("Expected name:size:timeout, got {:?}", s));
    };
    if name.is_empty() {
        return Err("Fixed entity name cannot be empty".to_string());
    }
    let size = match *size {
        "" => None,
        v => Some(v.parse::<u32>().map_err(|_| format!("Invalid size in {:?}", s))?),
    };
    let timeout = match *timeout {
        "" => None,
        v => Some(v.parse::<u64>().map_err(|_| format!("Invalid timeout in {:?}", s))?),
    };
    Ok(FixedEntry {
        name: name.to_string(),
        batch: NodeBatch { size, timeout },
    })
}

/// Parse duration from string (e.g., "10s", "500ms", "1.5s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix("us") {
        (stripped, "us")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let seconds = match unit {
        "us" => num / 1_000_000.0,
        "ms" => num / 1_000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Duration::from_secs_f64(seconds))
}

/// Commands used to reach the router and the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommands {
    pub vppctl: Vec<String>,
    pub perf: Vec<String>,
    pub ps: Vec<String>,
    pub timeout: Option<Duration>,
    pub verbose: bool,
}

/// Everything needed to run one sweep, validated
pub struct SweepPlan {
    pub options: SweepOptions,
    pub space: Box<dyn ConfigSpace>,
    pub control: ControlSettings,
    pub tools: ToolCommands,
    pub record: RecordSink,
    pub recorder: RecorderOptions,
    pub output_file: PathBuf,
    pub emit_configs: Option<PathBuf>,
}

impl SweepPlan {
    /// Create a sweep plan from CLI arguments
    ///
    /// Every input is checked here, before any command is issued.
    ///
    /// ## Returns
    /// - `Ok(SweepPlan)`: Valid plan ready for use
    /// - `Err(anyhow::Error)`: Invalid sizes, names, timing or an unreadable
    ///   configuration file
    pub fn from_args(args: &Args) -> Result<Self> {
        validate_repeat_count(args.repeat_count)?;
        for size in args.sizes.iter().chain(&args.secondary_sizes) {
            validate_batch_size(*size)?;
        }
        for name in args.nodes.iter().chain(&args.threads) {
            validate_entity_name(name)?;
        }
        validate_entity_name(&args.rx_interface)?;
        validate_entity_name(&args.tx_interface)?;

        let stats = match args.stats {
            StatsMode::VppNodes => StatPlan::vpp_nodes(args.threads.clone()),
            StatsMode::Total => StatPlan::total(args.threads.clone()),
            StatsMode::TotalWithMonitor => StatPlan::total_with_monitor(args.threads.clone()),
        };
        if stats.is_self_timed() && args.duration.is_zero() {
            anyhow::bail!("Counter statistics need a non-zero --duration");
        }

        let apply = args.apply.unwrap_or_else(|| args.settings.default_apply());
        let mut space = build_space(args)?;
        if let Some((index, err)) = space
            .configurations()
            .enumerate()
            .find_map(|(i, c)| apply.check(&c).err().map(|e| (i + 1, e)))
        {
            return Err(anyhow::Error::new(err).context(format!(
                "Configuration {} cannot be applied with --apply {}",
                index, apply
            )));
        }
        if let Some(seed) = args.shuffle {
            space = Box::new(crate::config_space::ConfigList::collect(space.as_ref()).shuffled(seed));
        }

        let options = SweepOptions {
            experiment_id: args
                .experiment_id
                .clone()
                .unwrap_or_else(generate_experiment_id),
            apply,
            stats,
            settle: args.settle,
            duration: args.duration,
            repeat_count: args.repeat_count,
            repeat_interval: args.repeat_interval,
            reset_counters: !args.no_reset,
            baseline_reset: !args.no_baseline_reset,
            validate: args.validate,
        };

        let perfmon_columns = match args.perfmon_schema {
            PerfmonSchemaArg::Auto => PerfmonColumns::Infer(PerfmonSchema::cache_detail()),
            PerfmonSchemaArg::CacheDetail => PerfmonColumns::Fixed(PerfmonSchema::cache_detail()),
            PerfmonSchemaArg::CacheHierarchy => {
                PerfmonColumns::Fixed(PerfmonSchema::cache_hierarchy())
            }
        };
        let control = ControlSettings {
            perfmon_bundle: Some(args.perfmon_bundle.trim().to_string()).filter(|b| !b.is_empty()),
            perfmon_columns,
            runtime_schema: match args.runtime_columns {
                RuntimeColumns::Batching => RuntimeSchema::batching(),
                RuntimeColumns::Stock => RuntimeSchema::stock(),
            },
            perf_events: args.perf_events.clone(),
            measurement: args.duration,
            monitor_interface: args.tx_interface.clone(),
        };

        Ok(Self {
            options,
            space,
            control,
            tools: ToolCommands {
                vppctl: split_command(&args.vppctl),
                perf: split_command(&args.perf),
                ps: split_command(&args.ps),
                timeout: args.command_timeout,
                verbose: args.verbose > 0,
            },
            record: args.record,
            recorder: RecorderOptions {
                table_path: args.table_path.clone(),
                table_name: args.table_name.clone(),
                jsonl_path: args.jsonl_path.clone(),
            },
            output_file: args.output_file.clone(),
            emit_configs: args.emit_configs.clone(),
        })
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn interface_sweep(args: &Args) -> Result<InterfaceSweep> {
    let sizes = args
        .interface_sizes
        .clone()
        .unwrap_or_else(|| args.sizes.clone());
    for size in &sizes {
        validate_batch_size(*size)?;
    }
    let timeouts = args.interface_timeouts.clone().unwrap_or_else(|| {
        args.timeouts
            .iter()
            .map(|us| *us as f64 / 1_000_000.0)
            .collect()
    });
    Ok(InterfaceSweep::new(args.rx_interface.clone(), sizes, timeouts)?)
}

fn constrained(args: &Args, comparison: Comparison) -> Result<ConstrainedPair> {
    let primary_sizes = args
        .primary_sizes
        .clone()
        .unwrap_or_else(crate::defaults::primary_sizes);
    for size in &primary_sizes {
        validate_batch_size(*size)?;
    }
    let secondaries = args
        .secondaries
        .clone()
        .unwrap_or_else(crate::defaults::secondaries);
    for name in std::iter::once(&args.primary).chain(&secondaries) {
        validate_entity_name(name)?;
    }
    Ok(ConstrainedPair {
        primary: args.primary.clone(),
        primary_sizes,
        secondaries,
        secondary_sizes: args.secondary_sizes.clone(),
        worker_count: args.workers,
        timeout: args.constrained_timeout,
        comparison,
        fixed: args
            .fixed
            .iter()
            .map(|f| (f.name.clone(), f.batch))
            .collect(),
    }
    .validate()?)
}

/// Product of one uniform sweep per node group, then of the interface sweep.
fn grouped(args: &Args) -> Result<Box<dyn ConfigSpace>> {
    let mut groups = args.node_groups.iter().map(|group| -> Result<UniformSweep> {
        let nodes: Vec<String> = group
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        for node in &nodes {
            validate_entity_name(node)?;
        }
        Ok(UniformSweep::new(nodes, args.sizes.clone(), args.timeouts.clone())?)
    });

    let first = groups.next().context("--node-groups must name at least one group")??;
    let mut space: Box<dyn ConfigSpace> = Box::new(first);
    for group in groups {
        space = Box::new(Product::new(space, group?, args.max_combinations)?);
    }
    Ok(Box::new(Product::new(
        space,
        interface_sweep(args)?,
        args.max_combinations,
    )?))
}

fn build_space(args: &Args) -> Result<Box<dyn ConfigSpace>> {
    let uniform = || UniformSweep::new(args.nodes.clone(), args.sizes.clone(), args.timeouts.clone());
    let combinations = || {
        FullCombination::new(
            args.nodes.clone(),
            args.sizes.clone(),
            args.timeouts.clone(),
            args.max_combinations,
        )
    };

    let space: Box<dyn ConfigSpace> = match args.settings {
        SettingsMode::NodeBatch => Box::new(uniform()?),
        SettingsMode::NodeCombinations => Box::new(combinations()?),
        SettingsMode::InterfaceBatch => Box::new(interface_sweep(args)?),
        SettingsMode::NodeAndInterface => Box::new(Zip::new(uniform()?, interface_sweep(args)?)?),
        SettingsMode::NodeAndInterfaceCombinations => Box::new(Product::new(
            combinations()?,
            interface_sweep(args)?,
            args.max_combinations,
        )?),
        SettingsMode::GroupedCombinations => grouped(args)?,
        SettingsMode::ConstrainedEqual => Box::new(constrained(args, Comparison::Equal)?),
        SettingsMode::ConstrainedLess => Box::new(constrained(args, Comparison::Less)?),
        SettingsMode::ConstrainedGreater => Box::new(constrained(args, Comparison::Greater)?),
        SettingsMode::File => {
            let path = args
                .settings_file
                .as_ref()
                .context("--settings file requires --settings-file")?;
            Box::new(
                load_configurations(path)
                    .with_context(|| format!("Failed to load configurations from {:?}", path))?,
            )
        }
    };
    Ok(space)
}
