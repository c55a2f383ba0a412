//! Kernel configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//!
//! ```yaml
//! persona_id: pioneer_v2
//! bus:
//!   queue_capacity: 256
//! memory:
//!   capacity: 12
//!   journal_path: logs/journal.jsonl
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::BusConfig;

/// Version stamped into every artifact's metadata.
pub const CONTRACT_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub time_bucket_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            time_bucket_secs: crate::persona::sampler::DEFAULT_TIME_BUCKET_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub threshold: f64,
    pub history_window: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            threshold: crate::persona::stance::DEFAULT_DRIFT_THRESHOLD,
            history_window: crate::persona::stance::DEFAULT_HISTORY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    /// Reflection journal location. `None` disables journaling.
    pub journal_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: crate::memory::short_term::DEFAULT_CAPACITY,
            journal_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    pub decay_rate: f64,
    /// Decay is scaled by this factor while the persona is LOCKED.
    pub locked_decay_multiplier: f64,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            decay_rate: crate::persona::affect::DEFAULT_DECAY_RATE,
            locked_decay_multiplier: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Influence used for every scene except STRICT_FACT.
    pub base_influence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_influence: 1.0,
        }
    }
}

// ============================================================================
// KernelConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub persona_id: String,
    pub bus: BusConfig,
    pub sampler: SamplerConfig,
    pub drift: DriftConfig,
    pub memory: MemoryConfig,
    pub affect: AffectConfig,
    pub engine: EngineConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            persona_id: "pioneer_v2".to_string(),
            bus: BusConfig::default(),
            sampler: SamplerConfig::default(),
            drift: DriftConfig::default(),
            memory: MemoryConfig::default(),
            affect: AffectConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = if yaml.trim().is_empty() {
            KernelConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        log::info!("[Config] Loaded kernel config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persona_id.trim().is_empty() {
            return Err(invalid("persona_id", "must not be empty"));
        }
        if self.bus.queue_capacity == 0 {
            return Err(invalid("bus.queue_capacity", "must be at least 1"));
        }
        if self.sampler.time_bucket_secs == 0 {
            return Err(invalid("sampler.time_bucket_secs", "must be at least 1"));
        }
        if !(self.drift.threshold > 0.0 && self.drift.threshold <= 2.0) {
            return Err(invalid(
                "drift.threshold",
                format!("{} is outside (0, 2]", self.drift.threshold),
            ));
        }
        if self.drift.history_window == 0 {
            return Err(invalid("drift.history_window", "must be at least 1"));
        }
        if self.memory.capacity < crate::memory::short_term::PROTECTED_RECENT {
            return Err(invalid(
                "memory.capacity",
                format!("{} is below the minimum of 2", self.memory.capacity),
            ));
        }
        if !(0.0..=1.0).contains(&self.affect.decay_rate) {
            return Err(invalid(
                "affect.decay_rate",
                format!("{} is outside [0, 1]", self.affect.decay_rate),
            ));
        }
        if !(0.0..=1.0).contains(&self.affect.locked_decay_multiplier) {
            return Err(invalid(
                "affect.locked_decay_multiplier",
                format!("{} is outside [0, 1]", self.affect.locked_decay_multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.engine.base_influence) {
            return Err(invalid(
                "engine.base_influence",
                format!("{} is outside [0, 1]", self.engine.base_influence),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
