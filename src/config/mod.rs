//! Configuration loading and validation

mod settings;

pub use settings::{
    DispatchSettings, PayloadSettings, QuotaSettings, RateSettings, ReconSettings, RetrySettings,
    SandboxSettings, ScoringSettings,
};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Orchestrator configuration, built once per orchestrator instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub quota: QuotaSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub scoring: ScoringSettings,

    #[serde(default)]
    pub sandbox: SandboxSettings,

    #[serde(default)]
    pub payload: PayloadSettings,

    #[serde(default)]
    pub recon: ReconSettings,
}

impl OrchestratorConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: OrchestratorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for: .bountyhub/config.toml, falling back to defaults
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(".bountyhub/config.toml");
        if path.exists() {
            return Self::from_file(&path);
        }
        Ok(Self::default())
    }

    /// Global config location (`~/.bountyhub/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".bountyhub").join("config.toml"))
    }

    /// Reject values that would make dispatch, quota or sandbox meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_fan_out == 0 {
            return Err(ConfigError::Zero {
                field: "dispatch.max_fan_out",
            });
        }
        if self.dispatch.module_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "dispatch.module_timeout_secs",
            });
        }
        for (field, rate) in [
            ("quota.premium", &self.quota.premium),
            ("quota.enterprise", &self.quota.enterprise),
        ] {
            if rate.requests_per_second == 0 || rate.burst == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "retry.max_attempts",
            });
        }
        if !(1.0..=10.0).contains(&self.retry.multiplier) {
            return Err(ConfigError::OutOfRange {
                field: "retry.multiplier",
                min: 1.0,
                max: 10.0,
                value: self.retry.multiplier,
            });
        }
        if !(0.0..=1.0).contains(&self.scoring.min_confidence) {
            return Err(ConfigError::OutOfRange {
                field: "scoring.min_confidence",
                min: 0.0,
                max: 1.0,
                value: self.scoring.min_confidence,
            });
        }
        if !(self.sandbox.cpu_share > 0.0 && self.sandbox.cpu_share <= 64.0) {
            return Err(ConfigError::OutOfRange {
                field: "sandbox.cpu_share",
                min: 0.0,
                max: 64.0,
                value: self.sandbox.cpu_share,
            });
        }
        if self.sandbox.memory_mb == 0 {
            return Err(ConfigError::Zero {
                field: "sandbox.memory_mb",
            });
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "sandbox.timeout_secs",
            });
        }
        self.sandbox.min_severity()?;
        if self.payload.formats.is_empty() {
            return Err(ConfigError::NoPayloadFormats);
        }
        Ok(())
    }
}
