//! Sentinel configuration
//!
//! Configuration lives in `<root>/.sentinel/sentinel.toml`. Every section is
//! optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};

/// Name of the project-local data directory
pub const DATA_DIR: &str = ".sentinel";
/// Config file name inside [`DATA_DIR`]
pub const CONFIG_FILE: &str = "sentinel.toml";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentinelConfig {
    pub scheduler: SchedulerConfig,
    pub guard: GuardConfig,
    pub classify: ClassifyConfig,
    pub watch: WatchConfig,
    pub metrics: MetricsConfig,
    pub shutdown: ShutdownConfig,
}

/// Batching and debounce settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Queue depth at which the standard delay applies
    pub batch_size_target: usize,
    /// Hard cap on entries per batch; reaching it triggers the burst delay
    pub max_batch_size: usize,
    pub standard_delay_ms: u64,
    pub burst_delay_ms: u64,
    /// How often the scheduler loop re-evaluates the pending set
    pub tick_ms: u64,
    /// Pending paths kept before the oldest are evicted
    pub max_pending: usize,
    /// Waiting this long earns an entry +1 priority
    pub age_boost_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size_target: 5,
            max_batch_size: 10,
            standard_delay_ms: 300,
            burst_delay_ms: 100,
            tick_ms: 50,
            max_pending: 10_000,
            age_boost_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn standard_delay(&self) -> Duration {
        Duration::from_millis(self.standard_delay_ms)
    }

    pub fn burst_delay(&self) -> Duration {
        Duration::from_millis(self.burst_delay_ms)
    }

    /// Delay used for a trickle of edits: 1.5x the standard delay
    pub fn trickle_delay(&self) -> Duration {
        Duration::from_millis(self.standard_delay_ms + self.standard_delay_ms / 2)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn age_boost_interval(&self) -> Duration {
        Duration::from_secs(self.age_boost_secs)
    }
}

/// Resource budgets enforced by the guards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Resident memory of this process above which work is deferred
    pub max_heap_mb: u64,
    /// Cumulative validation time allowed per batch
    pub max_batch_time_ms: u64,
    /// Concurrent validations per batch
    pub max_workers: usize,
    /// Optional process CPU ceiling (percent of one core)
    pub max_cpu_percent: Option<f32>,
    /// Files larger than this are never read
    pub max_file_size_bytes: u64,
    /// Reads slower than this count as a per-file failure
    pub read_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_heap_mb: 500,
            max_batch_time_ms: 5000,
            max_workers: 4,
            max_cpu_percent: None,
            max_file_size_bytes: MIB,
            read_timeout_ms: 2000,
        }
    }
}

impl GuardConfig {
    pub fn max_heap_bytes(&self) -> u64 {
        self.max_heap_mb.saturating_mul(MIB)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Globs used to assign priority to changed paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyConfig {
    pub source_patterns: Vec<String>,
    pub config_patterns: Vec<String>,
    pub test_patterns: Vec<String>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            source_patterns: vec![
                "src/**".to_string(),
                "**/src/**".to_string(),
                "lib/**".to_string(),
                "**/lib/**".to_string(),
                "app/**".to_string(),
                "**/app/**".to_string(),
            ],
            config_patterns: vec![
                "**/*.toml".to_string(),
                "**/*.json".to_string(),
                "**/*.yaml".to_string(),
                "**/*.yml".to_string(),
                "**/*.ini".to_string(),
                "**/.env*".to_string(),
                "**/*config*".to_string(),
            ],
            test_patterns: vec![
                "**/test/**".to_string(),
                "**/tests/**".to_string(),
                "**/__tests__/**".to_string(),
                "**/*_test.*".to_string(),
                "**/*.test.*".to_string(),
                "**/*.spec.*".to_string(),
                "**/test_*".to_string(),
            ],
        }
    }
}

/// What the change detector forwards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Extensions to validate (empty = built-in list)
    pub extensions: Vec<String>,
    /// Patterns to ignore during watching and scanning
    pub ignore_patterns: Vec<String>,
    /// Enqueue every supported file once on start
    pub initial_scan: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: vec![],
            ignore_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/build/**".to_string(),
                "**/dist/**".to_string(),
                "**/.git/**".to_string(),
                "**/*.min.js".to_string(),
                "**/*.bundle.js".to_string(),
                "**/.sentinel/**".to_string(), // Don't validate our own data
            ],
            initial_scan: false,
        }
    }
}

/// Aggregation, scoring and persistence settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Results kept for recent-activity queries
    pub recent_capacity: usize,
    /// Hourly cost of a developer, used for ROI
    pub hourly_rate: f64,
    /// Hours of saved time that count as a full score
    pub time_saved_target_hours: f64,
    /// Scores kept for trend classification
    pub trend_window: usize,
    /// History file; relative paths resolve against the data directory
    pub history_path: PathBuf,
    pub history_retention: usize,
    pub snapshot_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 1000,
            hourly_rate: 50.0,
            time_saved_target_hours: 8.0,
            trend_window: 20,
            history_path: PathBuf::from("metrics-history.json"),
            history_retention: 100,
            snapshot_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight validations may run after stop is requested
    pub grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_ms: 5000 }
    }
}

impl SentinelConfig {
    /// Path of the config file for a project root
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(DATA_DIR).join(CONFIG_FILE)
    }

    /// Load configuration for a project root, using defaults when no file exists
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = Self::config_path(root);

        if !config_path.exists() {
            warn!(
                "Configuration file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)?;

        let config: SentinelConfig =
            toml::from_str(&config_content).map_err(|source| SentinelError::ConfigParse {
                path: config_path.to_path_buf(),
                source,
            })?;
        config.validate()?;

        debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Write configuration as `sentinel.toml` under the project's data directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_path = Self::config_path(root);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, toml_content)?;

        debug!("Saved configuration to: {}", config_path.display());
        Ok(())
    }

    /// Reject combinations the scheduler cannot honour
    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.max_batch_size == 0 {
            return Err(SentinelError::InvalidConfig(
                "scheduler.max_batch_size must be at least 1".to_string(),
            ));
        }
        if scheduler.batch_size_target == 0 || scheduler.batch_size_target > scheduler.max_batch_size
        {
            return Err(SentinelError::InvalidConfig(format!(
                "scheduler.batch_size_target must be between 1 and max_batch_size ({})",
                scheduler.max_batch_size
            )));
        }
        if scheduler.max_pending < scheduler.max_batch_size {
            return Err(SentinelError::InvalidConfig(
                "scheduler.max_pending must be at least max_batch_size".to_string(),
            ));
        }
        if self.metrics.recent_capacity == 0 {
            return Err(SentinelError::InvalidConfig(
                "metrics.recent_capacity must be at least 1".to_string(),
            ));
        }
        if self.metrics.time_saved_target_hours <= 0.0 {
            return Err(SentinelError::InvalidConfig(
                "metrics.time_saved_target_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the history file against the project root
    pub fn history_path(&self, root: &Path) -> PathBuf {
        if self.metrics.history_path.is_absolute() {
            self.metrics.history_path.clone()
        } else {
            root.join(DATA_DIR).join(&self.metrics.history_path)
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_ms)
    }
}
