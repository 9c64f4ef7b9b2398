//! Configuration structures for the access rule engine
//!
//! This module contains the engine configuration structure, the command line
//! interface of the replay binary, and the validation logic applied before an
//! engine is constructed.
//!
//! Configuration is layered: built-in defaults, then an optional JSON file, then
//! command line overrides.

use super::PassbackPolicy;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound for passback windows and state lifetimes, in seconds (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for the actuation timeout and linkage backoff, in milliseconds
pub const MAX_DELAY_MS: u64 = 10 * 60 * 1000;

/// Upper bound for the rule catalog cache lifetime, in seconds
pub const MAX_RULE_CACHE_TTL_SECS: u64 = 60;

/// Command line arguments structure
#[derive(Debug, Clone, Parser)]
#[command(
    name = "access-rule-engine",
    version = "0.1.0",
    about = "Access Rule Engine - Enforces passback, interlock and linkage rules on access events",
    long_about = "Replays access-control events through the rule enforcement engine. Each event is checked for passback violations; accepted events then drive interlock locks between paired areas and linkage actions on other devices.

EXAMPLES:
    # Replay events against a facility catalog
    access-rule-engine --catalog site.json --events events.jsonl

    # Use a configuration file and write audit records
    access-rule-engine --config engine.json --catalog site.json --events events.jsonl --audit-output audit.jsonl

    # Tighten the HARD passback window
    access-rule-engine --catalog site.json --events events.jsonl --hard-window-secs 120

    # Generate configuration template
    access-rule-engine --print-config > engine.json

    # Validate configuration and catalog without replaying
    access-rule-engine --config engine.json --catalog site.json --dry-run

CONFIGURATION:
    Configuration can be provided via:
    1. Command line arguments (highest priority)
    2. Configuration file (--config flag)
    3. Default values (lowest priority)

    Supported configuration file formats: JSON (.json)

    Use --print-config to generate a template configuration file."
)]
pub struct CliArgs {
    /// Configuration file path (JSON format)
    #[arg(
        short,
        long,
        help = "Configuration file path (JSON format)",
        long_help = "Path to a JSON configuration file. CLI arguments will override file settings."
    )]
    pub config: Option<String>,

    /// Facility and rule catalog file path
    #[arg(
        long,
        help = "Facility and rule catalog (JSON)",
        long_help = "Path to a JSON catalog describing areas, devices, doors, interlock rules and linkage rules."
    )]
    pub catalog: Option<String>,

    /// Access events to replay
    #[arg(
        long,
        help = "Access events to replay (JSONL)",
        long_help = "Path to a JSON Lines file with one access event per line. Events are processed in file order."
    )]
    pub events: Option<String>,

    /// Audit output path
    #[arg(long, help = "Write audit records to this JSONL file")]
    pub audit_output: Option<String>,

    /// HARD/SOFT passback window in seconds
    #[arg(
        long,
        help = "HARD/SOFT passback window in seconds",
        long_help = "Window during which a repeat event at the same device is a passback violation. Must be greater than 0. Default: 300"
    )]
    pub hard_window_secs: Option<u64>,

    /// AREA passback window in seconds
    #[arg(long, help = "AREA passback window in seconds")]
    pub area_window_secs: Option<u64>,

    /// GLOBAL passback window in seconds
    #[arg(long, help = "GLOBAL passback window in seconds")]
    pub global_window_secs: Option<u64>,

    /// Number of entries kept in each user's GLOBAL history
    #[arg(long, help = "GLOBAL history entries kept per user")]
    pub global_history_limit: Option<usize>,

    /// Background worker count
    #[arg(
        long,
        help = "Number of background workers",
        long_help = "Maximum number of interlock and linkage tasks executing at once. Must be greater than 0. Default: 10"
    )]
    pub worker_count: Option<usize>,

    /// Actuation timeout in milliseconds
    #[arg(long, help = "Device command timeout in milliseconds")]
    pub actuation_timeout_ms: Option<u64>,

    /// Linkage retry count
    #[arg(
        long,
        help = "Retries for failed linkage actions",
        long_help = "Number of additional attempts for a failed linkage action. Interlock locks are never retried. Default: 0"
    )]
    pub linkage_max_retries: Option<u32>,

    /// Linkage rows kept in memory
    #[arg(
        long,
        help = "Linkage execution rows kept in memory",
        long_help = "Number of linkage execution rows kept for queries. The oldest finished rows are evicted first; pending rows are never evicted. Default: 10000"
    )]
    pub linkage_log_capacity: Option<usize>,

    /// Devices the simulated actuator should reject
    #[arg(
        long = "fail-device",
        value_name = "DEVICE",
        help = "Simulate a device that rejects commands (repeatable)"
    )]
    pub fail_devices: Vec<String>,

    /// Simulated actuator latency in milliseconds
    #[arg(long, help = "Simulated device response latency in milliseconds")]
    pub actuation_latency_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    /// Directory for rolling log files
    #[arg(long, help = "Write daily rolling log files into this directory")]
    pub log_dir: Option<String>,

    /// Dry run mode - validate configuration without replaying events
    #[arg(long, help = "Validate configuration and catalog without replaying events")]
    pub dry_run: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in JSON format and exit")]
    pub print_config: bool,
}

/// Configuration file structure (allows partial configuration)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// HARD/SOFT passback window in seconds
    pub hard_window_secs: Option<u64>,

    /// AREA passback window in seconds
    pub area_window_secs: Option<u64>,

    /// GLOBAL passback window in seconds
    pub global_window_secs: Option<u64>,

    /// Entries kept in each user's GLOBAL history
    pub global_history_limit: Option<usize>,

    /// Minimum lifetime of passback state entries in seconds
    pub passback_state_ttl_secs: Option<u64>,

    /// Lifetime of a user's soft exception list in seconds
    pub soft_exception_ttl_secs: Option<u64>,

    /// Background worker count
    pub worker_count: Option<usize>,

    /// Device command timeout in milliseconds
    pub actuation_timeout_ms: Option<u64>,

    /// Additional attempts for failed linkage actions
    pub linkage_max_retries: Option<u32>,

    /// Base backoff between linkage attempts in milliseconds
    pub linkage_retry_backoff_ms: Option<u64>,

    /// Rule catalog cache lifetime in seconds
    pub rule_cache_ttl_secs: Option<u64>,

    /// Linkage execution rows kept in memory
    pub linkage_log_capacity: Option<usize>,
}

/// Configuration for the access rule engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HARD/SOFT passback window in seconds
    pub hard_window_secs: u64,

    /// AREA passback window in seconds
    pub area_window_secs: u64,

    /// GLOBAL passback window in seconds
    pub global_window_secs: u64,

    /// Entries kept in each user's GLOBAL history
    pub global_history_limit: usize,

    /// Minimum lifetime of passback state entries in seconds
    pub passback_state_ttl_secs: u64,

    /// Lifetime of a user's soft exception list in seconds
    pub soft_exception_ttl_secs: u64,

    /// Background worker count
    pub worker_count: usize,

    /// Device command timeout in milliseconds
    pub actuation_timeout_ms: u64,

    /// Additional attempts for failed linkage actions
    pub linkage_max_retries: u32,

    /// Base backoff between linkage attempts in milliseconds
    pub linkage_retry_backoff_ms: u64,

    /// Rule catalog cache lifetime in seconds
    pub rule_cache_ttl_secs: u64,

    /// Linkage execution rows kept in memory
    pub linkage_log_capacity: usize,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Configuration file read error
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// JSON parsing error
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format: {0} (supported: .json)")]
    UnsupportedFormat(String),
}

/// Validation errors for engine configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A passback window is zero
    #[error("{field} must be greater than 0")]
    ZeroWindow {
        /// Name of the offending field
        field: &'static str,
    },

    /// GLOBAL history limit is zero
    #[error("global_history_limit must be greater than 0")]
    ZeroHistoryLimit,

    /// State would expire before the window it guards
    #[error("passback_state_ttl_secs ({ttl}) must be at least the longest window ({window})")]
    StateTtlTooShort {
        /// Configured state lifetime
        ttl: u64,
        /// Longest configured window
        window: u64,
    },

    /// Worker count is zero
    #[error("worker_count must be greater than 0")]
    ZeroWorkers,

    /// Actuation timeout is zero
    #[error("actuation_timeout_ms must be greater than 0")]
    ZeroActuationTimeout,

    /// A duration setting exceeds its ceiling
    #[error("{field} ({value}) must not exceed {max}")]
    TooLarge {
        /// Name of the offending field
        field: &'static str,
        /// Configured value
        value: u64,
        /// Largest accepted value
        max: u64,
    },

    /// Linkage log capacity is zero
    #[error("linkage_log_capacity must be greater than 0")]
    ZeroLogCapacity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hard_window_secs: 300,
            area_window_secs: 600,
            global_window_secs: 900,
            global_history_limit: 10,
            passback_state_ttl_secs: 1800,
            soft_exception_ttl_secs: 86_400,
            worker_count: 10,
            actuation_timeout_ms: 3000,
            linkage_max_retries: 0,
            linkage_retry_backoff_ms: 500,
            rule_cache_ttl_secs: 5,
            linkage_log_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration from command line arguments and optional config file
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::from_cli_args(&args)
    }

    /// Create configuration from parsed CLI arguments
    pub fn from_cli_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        Self::apply_cli_overrides(&mut config, args);

        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let content = fs::read_to_string(path)?;
                let config_file: ConfigFile = serde_json::from_str(&content)?;
                Ok(Self::from_config_file(config_file))
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }

    /// Create configuration from a config file, merging with defaults
    fn from_config_file(file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            hard_window_secs: file.hard_window_secs.unwrap_or(defaults.hard_window_secs),
            area_window_secs: file.area_window_secs.unwrap_or(defaults.area_window_secs),
            global_window_secs: file.global_window_secs.unwrap_or(defaults.global_window_secs),
            global_history_limit: file
                .global_history_limit
                .unwrap_or(defaults.global_history_limit),
            passback_state_ttl_secs: file
                .passback_state_ttl_secs
                .unwrap_or(defaults.passback_state_ttl_secs),
            soft_exception_ttl_secs: file
                .soft_exception_ttl_secs
                .unwrap_or(defaults.soft_exception_ttl_secs),
            worker_count: file.worker_count.unwrap_or(defaults.worker_count),
            actuation_timeout_ms: file
                .actuation_timeout_ms
                .unwrap_or(defaults.actuation_timeout_ms),
            linkage_max_retries: file
                .linkage_max_retries
                .unwrap_or(defaults.linkage_max_retries),
            linkage_retry_backoff_ms: file
                .linkage_retry_backoff_ms
                .unwrap_or(defaults.linkage_retry_backoff_ms),
            rule_cache_ttl_secs: file
                .rule_cache_ttl_secs
                .unwrap_or(defaults.rule_cache_ttl_secs),
            linkage_log_capacity: file
                .linkage_log_capacity
                .unwrap_or(defaults.linkage_log_capacity),
        }
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(config: &mut Self, args: &CliArgs) {
        if let Some(value) = args.hard_window_secs {
            config.hard_window_secs = value;
        }
        if let Some(value) = args.area_window_secs {
            config.area_window_secs = value;
        }
        if let Some(value) = args.global_window_secs {
            config.global_window_secs = value;
        }
        if let Some(value) = args.global_history_limit {
            config.global_history_limit = value;
        }
        if let Some(value) = args.worker_count {
            config.worker_count = value;
        }
        if let Some(value) = args.actuation_timeout_ms {
            config.actuation_timeout_ms = value;
        }
        if let Some(value) = args.linkage_max_retries {
            config.linkage_max_retries = value;
        }
        if let Some(value) = args.linkage_log_capacity {
            config.linkage_log_capacity = value;
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Print configuration as JSON
    pub fn print_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("hard_window_secs", self.hard_window_secs),
            ("area_window_secs", self.area_window_secs),
            ("global_window_secs", self.global_window_secs),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::ZeroWindow { field });
            }
        }

        for (field, value, max) in [
            ("hard_window_secs", self.hard_window_secs, MAX_DURATION_SECS),
            ("area_window_secs", self.area_window_secs, MAX_DURATION_SECS),
            ("global_window_secs", self.global_window_secs, MAX_DURATION_SECS),
            ("passback_state_ttl_secs", self.passback_state_ttl_secs, MAX_DURATION_SECS),
            ("soft_exception_ttl_secs", self.soft_exception_ttl_secs, MAX_DURATION_SECS),
            ("actuation_timeout_ms", self.actuation_timeout_ms, MAX_DELAY_MS),
            ("linkage_retry_backoff_ms", self.linkage_retry_backoff_ms, MAX_DELAY_MS),
            ("rule_cache_ttl_secs", self.rule_cache_ttl_secs, MAX_RULE_CACHE_TTL_SECS),
        ] {
            if value > max {
                return Err(ConfigValidationError::TooLarge { field, value, max });
            }
        }

        if self.global_history_limit == 0 {
            return Err(ConfigValidationError::ZeroHistoryLimit);
        }

        let longest = self.longest_window_secs();
        if self.passback_state_ttl_secs < longest {
            return Err(ConfigValidationError::StateTtlTooShort {
                ttl: self.passback_state_ttl_secs,
                window: longest,
            });
        }

        if self.worker_count == 0 {
            return Err(ConfigValidationError::ZeroWorkers);
        }

        if self.actuation_timeout_ms == 0 {
            return Err(ConfigValidationError::ZeroActuationTimeout);
        }

        if self.linkage_log_capacity == 0 {
            return Err(ConfigValidationError::ZeroLogCapacity);
        }

        Ok(())
    }

    fn longest_window_secs(&self) -> u64 {
        self.hard_window_secs
            .max(self.area_window_secs)
            .max(self.global_window_secs)
    }

    /// Violation window for a passback policy
    ///
    /// Clamped to [`MAX_DURATION_SECS`] so an unvalidated config cannot
    /// overflow timestamp arithmetic.
    pub fn window_for(&self, policy: PassbackPolicy) -> chrono::Duration {
        let secs = match policy {
            PassbackPolicy::Hard | PassbackPolicy::Soft => self.hard_window_secs,
            PassbackPolicy::Area => self.area_window_secs,
            PassbackPolicy::Global => self.global_window_secs,
        };
        chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
    }

    /// Lifetime of a passback state entry written under `policy`
    ///
    /// Never shorter than the policy window so an entry cannot expire while it
    /// still decides an outcome.
    pub fn state_ttl_for(&self, policy: PassbackPolicy) -> Duration {
        let window = self.window_for(policy).num_seconds().max(0) as u64;
        Duration::from_secs(window.max(self.passback_state_ttl_secs))
    }

    /// Lifetime of a user's soft exception list
    pub fn soft_exception_ttl(&self) -> Duration {
        Duration::from_secs(self.soft_exception_ttl_secs)
    }

    /// Device command timeout
    pub fn actuation_timeout(&self) -> Duration {
        Duration::from_millis(self.actuation_timeout_ms)
    }

    /// Base delay between linkage attempts
    pub fn linkage_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.linkage_retry_backoff_ms)
    }

    /// Rule catalog cache lifetime
    pub fn rule_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rule_cache_ttl_secs)
    }
}
