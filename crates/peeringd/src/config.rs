//! Configuration file support for peeringd
//!
//! Loads and validates peeringd configuration from TOML files.
//! Default location: /etc/ixp/peeringd.toml

use crate::error::{PeeringError, PeeringResult};
use crate::reconciler::ReconcilerConfig;
use ixp_orch_common::RetryPolicy;
use ixp_types::LinkType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ixp/peeringd.toml";

/// Reconciler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerSection {
    /// Retries per pair after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Pairs processed concurrently in one pass
    #[serde(default = "default_max_parallel_pairs")]
    pub max_parallel_pairs: usize,
}

/// Change trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSection {
    /// Debounce window in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

/// Link provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinksSection {
    /// Write new links as proposed and wait for confirmation
    #[serde(default)]
    pub two_phase: bool,

    /// Link type used when neither side asks for one
    #[serde(default)]
    pub default_link_type: LinkType,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of plain text
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Complete peeringd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringConfig {
    #[serde(default)]
    pub reconciler: ReconcilerSection,

    #[serde(default)]
    pub trigger: TriggerSection,

    #[serde(default)]
    pub links: LinksSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    2000
}

fn default_max_parallel_pairs() -> usize {
    16
}

fn default_debounce() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    true
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_parallel_pairs: default_max_parallel_pairs(),
        }
    }
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
        }
    }
}

impl Default for LinksSection {
    fn default() -> Self {
        Self {
            two_phase: false,
            default_link_type: LinkType::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl PeeringConfig {
    /// Load and validate configuration from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> PeeringResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PeeringError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content, path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> PeeringResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::parse(&content, path)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "peeringd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(PeeringError::configuration(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn parse(content: &str, path: &Path) -> PeeringResult<Self> {
        toml::from_str(content).map_err(|e| {
            PeeringError::configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> PeeringResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| {
            PeeringError::configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content).map_err(|e| {
            PeeringError::configuration(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.trigger.debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.reconciler.max_retries,
            Duration::from_millis(self.reconciler.initial_backoff_ms),
            Duration::from_millis(self.reconciler.max_backoff_ms),
        )
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            retry: self.retry_policy(),
            max_parallel_pairs: self.reconciler.max_parallel_pairs,
            two_phase: self.links.two_phase,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> PeeringResult<()> {
        let r = &self.reconciler;
        if r.max_retries == 0 {
            return Err(PeeringError::configuration("max_retries must be > 0"));
        }

        if r.initial_backoff_ms == 0 {
            return Err(PeeringError::configuration("initial_backoff_ms must be > 0"));
        }

        if r.max_backoff_ms < r.initial_backoff_ms {
            return Err(PeeringError::configuration(
                "max_backoff_ms must be >= initial_backoff_ms",
            ));
        }

        if r.max_parallel_pairs == 0 {
            return Err(PeeringError::configuration("max_parallel_pairs must be > 0"));
        }

        if self.trigger.debounce_ms == 0 {
            return Err(PeeringError::configuration("debounce_ms must be > 0"));
        }

        Ok(())
    }
}
