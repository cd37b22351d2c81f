use crate::config_space::Configuration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// What happened to one configuration of a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationOutcome {
    /// Position in the sweep, starting at 1
    pub index: usize,
    pub configuration: Configuration,
    pub applied: bool,
    /// Measurements that produced a record attempt
    pub measurements: usize,
    /// First error seen for this configuration, if any
    pub error: Option<String>,
}

/// Counters of a complete sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub experiment_id: String,
    pub configurations_seen: usize,
    pub configurations_applied: usize,
    pub apply_failures: usize,
    pub measurements: usize,
    pub measurement_failures: usize,
    pub records_written: usize,
    pub record_failures: usize,
    pub schema_conflicts: usize,
    /// The sweep stopped early on request
    pub interrupted: bool,
    pub elapsed: Duration,
    pub outcomes: Vec<ConfigurationOutcome>,
}

impl SweepSummary {
    pub fn new(experiment_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            ..Self::default()
        }
    }

    /// Every configuration was applied and every measurement recorded.
    pub fn is_clean(&self) -> bool {
        self.apply_failures == 0 && self.measurement_failures == 0 && self.record_failures == 0
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub hostname: Option<String>,
    pub cpu_cores: usize,
    pub rust_version: String,
    pub sweep_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            hostname: std::fs::read_to_string("/proc/sys/kernel/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty()),
            cpu_cores: crate::utils::get_cpu_cores(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            sweep_version: crate::VERSION.to_string(),
        }
    }
}

/// Final sweep results structure
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalSweepResults {
    pub metadata: SweepMetadata,
    pub summary: SweepSummary,
}

/// Sweep metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct SweepMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_configurations: usize,
    pub system_info: SystemInfo,
}

/// Writes the JSON summary of a finished sweep
pub struct ResultsManager {
    output_file: PathBuf,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
        }
    }

    /// Write the summary with metadata to the output file
    pub fn finalize(&self, summary: &SweepSummary) -> Result<()> {
        info!("Finalizing sweep summary");

        let final_results = FinalSweepResults {
            metadata: SweepMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_configurations: summary.configurations_seen,
                system_info: SystemInfo::default(),
            },
            summary: summary.clone(),
        };

        let json = serde_json::to_string_pretty(&final_results)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write summary to {:?}", self.output_file))?;

        info!("Summary written to: {:?}", self.output_file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_summary_is_clean() {
        let mut summary = SweepSummary::new("e1");
        assert!(summary.is_clean());
        summary.apply_failures = 1;
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_finalize_writes_metadata() {
        let temp_file = NamedTempFile::new().unwrap();
        let manager = ResultsManager::new(temp_file.path());
        let mut summary = SweepSummary::new("20240105143012");
        summary.configurations_seen = 3;
        summary.records_written = 2;
        manager.finalize(&summary).unwrap();

        let text = std::fs::read_to_string(temp_file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["metadata"]["total_configurations"], 3);
        assert_eq!(value["summary"]["experiment_id"], "20240105143012");
        assert_eq!(value["summary"]["records_written"], 2);
        assert!(value["metadata"]["system_info"]["cpu_cores"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_system_info_default() {
        let info = SystemInfo::default();

        assert!(!info.os.is_empty());
        assert!(!info.architecture.is_empty());
        assert!(info.cpu_cores > 0);
        assert_eq!(info.sweep_version, crate::VERSION);
    }
}
