//! # Batch Sweep - Main Entry Point
//!
//! Runs one sweep of batch size and timeout configurations against a live
//! VPP router and records a measurement for every configuration.
//!
//! ## Architecture Overview
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: Processes command-line configuration
//! 2. **Initialize logging**: Console output plus an optional log file
//! 3. **Create sweep plan**: Validates the arguments and builds the
//!    configuration space, control settings and recorder options
//! 4. **Run the sweep**: Applies, measures and records each configuration
//! 5. **Write the summary**: Outputs the sweep summary as JSON
//!
//! ## Error Handling
//!
//! Invalid arguments, an unusable tool command or an unopenable sink stop the
//! program before the first configuration. Once the sweep has started,
//! failures of single configurations are logged and counted in the summary;
//! they do not change the exit status. Only a summary that cannot be written
//! makes a started sweep exit non-zero.
//!
//! ## Interruption
//!
//! Ctrl-C stops the sweep before the next configuration. The records already
//! written stay in the sinks and the summary is still written, marked as
//! interrupted.

use anyhow::Result;
use batch_sweep::{
    cli::{Args, SweepPlan},
    command::CommandTool,
    config_space::write_configurations,
    control::VppControl,
    recorder::RecorderFactory,
    results::ResultsManager,
    runner::ExperimentRunner,
};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The guard flushes the log file when dropped at the end of main.
    let _log_guard = batch_sweep::logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting Batch Sweep {}", batch_sweep::VERSION);

    let plan = SweepPlan::from_args(&args)?;

    if let Some(path) = &plan.emit_configs {
        let written = write_configurations(path, &plan.space)?;
        info!("Wrote {} configurations to {:?}", written, path);
        return Ok(());
    }

    let tool = |command: &[String]| -> Result<CommandTool> {
        Ok(CommandTool::new(command.iter().cloned())?
            .with_verbose(plan.tools.verbose)
            .with_timeout(plan.tools.timeout))
    };
    let control = VppControl::new(
        tool(&plan.tools.vppctl)?,
        tool(&plan.tools.perf)?,
        tool(&plan.tools.ps)?,
        plan.control.clone(),
    );

    let recorder = RecorderFactory::create(&plan.record, &plan.recorder)?;
    info!("Recording to: {}", plan.record);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current configuration");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let runner = ExperimentRunner::new(plan.options.clone()).with_cancellation(cancel);
    let summary = runner.run(&control, &plan.space, recorder.as_ref()).await;

    ResultsManager::new(&plan.output_file).finalize(&summary)?;

    if !summary.is_clean() {
        warn!(
            "{} apply failures, {} measurement failures, {} record failures",
            summary.apply_failures, summary.measurement_failures, summary.record_failures
        );
    }
    if summary.interrupted {
        warn!("Sweep was interrupted");
    }
    Ok(())
}
