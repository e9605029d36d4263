//! Engine configuration types and loading
//!
//! All engine entry points take an explicit [`RunConfig`]; there is no
//! process-wide mode state. Configuration loads from YAML with a fallback
//! chain: explicit path, project-local `.metaprompt.yml`, user config
//! directory, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ledger::VarianceThresholds;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Completion service configuration
    pub llm: LlmConfig,

    /// Refinement loop defaults
    pub refine: RefineConfig,

    /// Composition engine defaults
    pub compose: ComposeConfig,

    /// Quality monitor window
    pub monitor: MonitorConfig,

    /// Budget variance thresholds
    pub budget: VarianceThresholds,
}

impl RunConfig {
    /// Validate configuration before use
    ///
    /// Call this early to fail fast with a clear message instead of deep in
    /// a run.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.refine.quality_threshold) {
            return Err(eyre::eyre!(
                "refine.quality-threshold {} outside [0,1]",
                self.refine.quality_threshold
            ));
        }
        if self.refine.max_iterations == 0 {
            return Err(eyre::eyre!("refine.max-iterations must be at least 1"));
        }
        if self.budget.halt < self.budget.investigate {
            return Err(eyre::eyre!(
                "budget.halt ({}) below budget.investigate ({})",
                self.budget.halt,
                self.budget.investigate
            ));
        }
        if self.monitor.window_size == 0 {
            return Err(eyre::eyre!("monitor.window-size must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".metaprompt.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("metaprompt").join("metaprompt.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Completion endpoint URL
    pub endpoint: String,

    /// Environment variable containing the API key; empty disables auth
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Maximum tokens per completion
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1/complete".to_string(),
            api_key_env: "METAPROMPT_API_KEY".to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
        }
    }
}

/// Refinement loop defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Aggregate quality at which refinement converges
    #[serde(rename = "quality-threshold")]
    pub quality_threshold: f64,

    /// Iteration cap regardless of convergence
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Pause between iterations in milliseconds
    #[serde(rename = "pacing-ms")]
    pub pacing_ms: u64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.85,
            max_iterations: 5,
            pacing_ms: 0,
        }
    }
}

/// How parallel branch qualities fold into one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationStrategy {
    /// Average of branch qualities (the default)
    Mean,
    /// Weakest link
    Min,
    /// Best alternative
    Max,
}

/// Composition engine defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Aggregation rule for Parallel nodes
    #[serde(rename = "parallel-aggregation")]
    pub parallel_aggregation: AggregationStrategy,

    /// Expected tokens for stages without an explicit `@budget` modifier
    #[serde(rename = "default-expected-tokens")]
    pub default_expected_tokens: u64,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            parallel_aggregation: AggregationStrategy::Mean,
            default_expected_tokens: 5000,
        }
    }
}

/// Quality monitor window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of scores kept in the circular window
    #[serde(rename = "window-size")]
    pub window_size: usize,

    /// Slope magnitude below which the trend counts as flat
    #[serde(rename = "trend-epsilon")]
    pub trend_epsilon: f64,

    /// Negative slope beyond this raises the degradation alarm
    #[serde(rename = "degradation-threshold")]
    pub degradation_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            trend_epsilon: 0.005,
            degradation_threshold: 0.02,
        }
    }
}
