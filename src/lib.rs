//! # Batch Sweep Library
//!
//! Experiment automation for a batching VPP build. A sweep walks a space of
//! batch size and timeout configurations, applies each one to a running
//! router through its CLI, measures the router with node, cache and
//! interface statistics, and records every measurement next to the
//! configuration that produced it.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `command`: Invocation of external tools with captured output
//! - `parsers`: Text report parsers (perfmon, runtime, latency, perf stat, ...)
//! - `stats`: Statistic records, per-thread snapshots and merged measurements
//! - `config_space`: Configuration values and the generators that enumerate them
//! - `control`: The `ControlInterface` trait and its VPP implementation
//! - `runner`: The sweep engine
//! - `recorder`: SQLite table and JSON Lines sinks
//! - `results`: The end-of-sweep JSON summary
//! - `cli`: Command-line parsing and the registries of settings, apply modes,
//!   statistic sets and sinks
//!
//! ## Usage Example
//!
//! ```rust
//! use batch_sweep::cli::{Args, SweepPlan};
//! use batch_sweep::ConfigSpace;
//! use clap::Parser;
//!
//! # fn main() -> anyhow::Result<()> {
//! let args = Args::parse_from([
//!     "batch-sweep",
//!     "--settings", "node-batch",
//!     "--nodes", "ip4-lookup,ip4-rewrite",
//!     "--sizes", "32,64",
//!     "--record", "jsonl",
//! ]);
//! let plan = SweepPlan::from_args(&args)?;
//! assert_eq!(plan.space.len(), 2);
//! # Ok(())
//! # }
//! ```

/// Command-line interface and sweep planning
///
/// Argument parsing with clap and conversion into a validated `SweepPlan`.
pub mod cli;

/// External tool invocation
pub mod command;

/// Configuration values and generators
///
/// Contains the `Configuration` type, the `ConfigSpace` trait and its
/// generators (uniform, full combination, constrained pairs, interface
/// sweeps, zip and product composition, file-backed lists).
pub mod config_space;

/// Router control and statistic collection
pub mod control;

pub mod error;

/// Log subscriber setup
pub mod logging;

/// Text report parsers
pub mod parsers;

/// Measurement sinks
///
/// SQLite table with schema evolution, JSON Lines file, and fan-out to both.
pub mod recorder;

/// End-of-sweep summary output
pub mod results;

/// The sweep engine
pub mod runner;

/// Statistic records and merged measurements
pub mod stats;

pub mod utils;

/// Command-line interface types
pub use cli::{Args, SweepPlan};

/// Core abstractions
///
/// The three seams of a sweep: what to apply, where to apply it and where
/// measurements go.
pub use config_space::{ConfigSpace, Configuration};
pub use control::{ControlInterface, VppControl};
pub use recorder::{ExperimentRecord, ExperimentRecorder};

/// Sweep execution and its result
pub use results::{ResultsManager, SweepSummary};
pub use runner::{ExperimentRunner, SweepOptions};

/// The current version of the sweep harness
///
/// Populated from Cargo.toml and written into the sweep summary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These match the lab setup the harness was built for: a two-port router
/// with NAT44 between `Ethernet0` (receive) and `Ethernet1` (transmit) and a
/// single worker thread.
pub mod defaults {
    use std::time::Duration;

    /// Graph nodes swept by the node settings
    pub const BATCH_NODES: [&str; 3] = [
        "nat44-ed-in2out",
        "nat44-ed-in2out-slowpath",
        "Ethernet1-output",
    ];

    /// Node groups of the grouped settings; nodes of one group share a
    /// setting
    pub const BATCH_NODES_IP4: [&str; 3] = ["ip4-lookup", "nat-pre-in2out", "ip4-inacl"];
    pub const BATCH_NODES_IP6: [&str; 1] = ["ip6-input"];
    pub const BATCH_NODES_ETH1: [&str; 1] = ["Ethernet1-output"];
    pub const NODE_GROUPS: [&[&str]; 3] = [&BATCH_NODES_IP4, &BATCH_NODES_IP6, &BATCH_NODES_ETH1];

    /// Node batch sizes
    pub const BATCH_SIZES: [u32; 4] = [32, 48, 64, 128];

    /// Node batch timeouts in microseconds
    pub const BATCH_TIMEOUTS: [u64; 1] = [100];

    /// Setting every swept node is restored to before a configuration is
    /// applied, as (size, timeout)
    pub const BASELINE_BATCH: (u32, u64) = (crate::utils::MAX_FRAME_SIZE, 0);

    /// Upper bound on full-combination spaces
    pub const MAX_COMBINATIONS: usize = 100_000;

    pub const RX_INTERFACE: &str = "Ethernet0";
    pub const TX_INTERFACE: &str = "Ethernet1";

    /// Worker threads kept in reports and measured by the counter tool
    pub const THREADS: [&str; 1] = ["vpp_wk_0"];

    /// Measurement window
    pub const DURATION: Duration = Duration::from_secs(10);

    /// [`DURATION`] as a command-line value
    pub const DURATION_ARG: &str = "10s";

    pub const REPEAT_COUNT: usize = 1;

    pub const PERFMON_BUNDLE: &str = "cache-detail";

    pub const VPPCTL_COMMAND: &str = "sudo vppctl -s /run/vpp/remote/cli_remote.sock";
    pub const PERF_COMMAND: &str = "sudo perf";
    pub const PS_COMMAND: &str = "ps";

    /// SQLite database path; `{experiment_id}` is substituted per sweep
    pub const TABLE_PATH: &str = "vpp_exp_{experiment_id}.sqlite";
    pub const TABLE_NAME: &str = "vpp_exp_data";
    pub const JSONL_PATH: &str = "experiments.jsonl";

    /// Sweep summary written at the end of every run
    pub const OUTPUT_FILE: &str = "sweep_summary.json";

    /// Constrained settings: entity whose size is compared against the
    /// aggregate secondary size
    pub const CONSTRAINED_PRIMARY: &str = "dispatcher";

    /// Constrained settings: worker count, also emitted as the dispatcher
    /// setting
    pub const WORKERS: u32 = 8;

    /// Constrained settings: timeout in microseconds
    pub const CONSTRAINED_TIMEOUT: u64 = 180;

    pub const SECONDARY_SIZES: [u32; 4] = [16, 20, 24, 28];

    /// Constrained settings: entity pinned in every configuration, as
    /// (name, size, timeout)
    pub const CONSTRAINED_FIXED: (&str, u32, u64) = ("ip6-lookup", 256, 0);

    /// Primary sizes: 16 to 256 in steps of 16
    pub fn primary_sizes() -> Vec<u32> {
        (16..=256).step_by(16).collect()
    }

    /// Secondary entities: `protocol1` to `protocol16`
    pub fn secondaries() -> Vec<String> {
        (1..=16).map(|i| format!("protocol{}", i)).collect()
    }
}
