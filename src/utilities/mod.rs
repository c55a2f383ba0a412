//! Kernel configuration and small shared helpers.

pub mod config;
pub mod trace;

pub use config::{
    AffectConfig, ConfigError, DriftConfig, EngineConfig, KernelConfig, MemoryConfig,
    SamplerConfig, CONTRACT_VERSION,
};
pub use trace::new_trace_id;
