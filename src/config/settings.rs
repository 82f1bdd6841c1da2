//! Settings sections of the orchestrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{Severity, ToolFormat};
use crate::error::ConfigError;
use crate::sandbox::ResourceLimits;

/// Module fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Maximum number of modules running concurrently for one request.
    /// Bounds outbound concurrency against a single target.
    #[serde(default = "default_max_fan_out")]
    pub max_fan_out: usize,

    /// Wall-clock limit for one module invocation
    #[serde(default = "default_module_timeout_secs")]
    pub module_timeout_secs: u64,
}

fn default_max_fan_out() -> usize {
    4
}

fn default_module_timeout_secs() -> u64 {
    30
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_fan_out: default_max_fan_out(),
            module_timeout_secs: default_module_timeout_secs(),
        }
    }
}

impl DispatchSettings {
    pub fn module_timeout(&self) -> Duration {
        Duration::from_secs(self.module_timeout_secs)
    }
}

/// Token bucket parameters for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSettings {
    pub requests_per_second: u32,
    pub burst: u32,
}

/// Usage limits per entitlement tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Hard cap on module invocations over a free session's lifetime
    #[serde(default = "default_free_tier_module_cap")]
    pub free_tier_module_cap: u32,

    #[serde(default = "default_premium_rate")]
    pub premium: RateSettings,

    #[serde(default = "default_enterprise_rate")]
    pub enterprise: RateSettings,
}

fn default_free_tier_module_cap() -> u32 {
    3
}

fn default_premium_rate() -> RateSettings {
    RateSettings {
        requests_per_second: 5,
        burst: 10,
    }
}

fn default_enterprise_rate() -> RateSettings {
    RateSettings {
        requests_per_second: 20,
        burst: 40,
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            free_tier_module_cap: default_free_tier_module_cap(),
            premium: default_premium_rate(),
            enterprise: default_enterprise_rate(),
        }
    }
}

/// Backoff for upstream calls made inside modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSettings {
    /// Findings with a module confidence below this are discarded before scoring
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.10
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

/// Isolated confirmation environment limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Fraction of one CPU granted to the environment
    #[serde(default = "default_cpu_share")]
    pub cpu_share: f64,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,

    /// Only findings at or above this raw severity are sent for confirmation
    #[serde(default = "default_confirm_min_severity")]
    pub confirm_min_severity: String,
}

fn default_cpu_share() -> f64 {
    0.5
}

fn default_memory_mb() -> u64 {
    512
}

fn default_sandbox_timeout_secs() -> u64 {
    120
}

fn default_confirm_min_severity() -> String {
    "high".to_string()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            cpu_share: default_cpu_share(),
            memory_mb: default_memory_mb(),
            timeout_secs: default_sandbox_timeout_secs(),
            confirm_min_severity: default_confirm_min_severity(),
        }
    }
}

impl SandboxSettings {
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_share: self.cpu_share,
            memory_mb: self.memory_mb,
            wall_clock: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn min_severity(&self) -> Result<Severity, ConfigError> {
        Severity::from_str(&self.confirm_min_severity)
            .ok_or_else(|| ConfigError::UnknownSeverity(self.confirm_min_severity.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadSettings {
    #[serde(default = "default_formats")]
    pub formats: Vec<ToolFormat>,
}

fn default_formats() -> Vec<ToolFormat> {
    ToolFormat::ALL.to_vec()
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            formats: default_formats(),
        }
    }
}

/// Recon source pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconSettings {
    /// Minimum interval between two calls to the same source
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_min_interval_ms() -> u64 {
    2_000
}

impl Default for ReconSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}
