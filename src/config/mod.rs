//! TOML-based optimizer configuration.
//!
//! All tunables have defaults matching the benchmarked setup; a config file
//! only needs to override what it changes:
//!
//! ```toml
//! timeout_millis = 120000
//! initial_budget_divisor = 50
//! budget_growth_factor = 10
//! verification_tolerance = 1.01
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Tunables for one optimization run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Wall-clock deadline for a run, checked between probes. An in-flight
    /// probe is never cancelled; only the loop's continuation is.
    pub timeout_millis: u64,

    /// The initial cardinality budget is the largest filtered base-table
    /// cardinality divided by this.
    pub initial_budget_divisor: u64,

    /// Budget multiplier applied when no probe can make progress.
    pub budget_growth_factor: u64,

    /// A relation verifies once `lower_bound * tolerance >= upper_bound`;
    /// absorbs rounding in engine-reported counts.
    pub verification_tolerance: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            timeout_millis: 60_000,
            initial_budget_divisor: 50,
            budget_growth_factor: 10,
            verification_tolerance: 1.01,
        }
    }
}

impl OptimizerSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let settings: OptimizerSettings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would stall or never terminate the loop.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.budget_growth_factor < 2 {
            return Err(SettingsError::InvalidConfig(
                "budget_growth_factor must be at least 2".to_string(),
            ));
        }
        if self.initial_budget_divisor == 0 {
            return Err(SettingsError::InvalidConfig(
                "initial_budget_divisor must be positive".to_string(),
            ));
        }
        if self.verification_tolerance < 1.0 {
            return Err(SettingsError::InvalidConfig(
                "verification_tolerance must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
