//! Kernel module system.
//!
//! A **module** is any component the kernel tracks by name: the pipeline
//! steps register themselves here during bootstrap so the kernel can list
//! them, pause or disable them, capture their state into snapshots, and
//! stop them on shutdown.
//!
//! ```rust
//! use std::sync::Arc;
//! use persona_kernel::modules::{KernelModule, ModuleInfo, ModuleRegistry, ModuleType};
//!
//! struct Heartbeat;
//! impl KernelModule for Heartbeat {}
//!
//! let registry = ModuleRegistry::builder()
//!     .module(ModuleInfo::new("heartbeat", ModuleType::Feature, Arc::new(Heartbeat)))
//!     .enabled()
//!     .build();
//! assert!(registry.contains("heartbeat"));
//! ```

pub mod error;
pub mod registry;

// Re-exports
pub use error::ModuleError;
pub use registry::{
    KernelModule, ModuleInfo, ModuleRegistry, ModuleRegistryBuilder, ModuleStatus, ModuleSummary,
    ModuleType, RegistryStats, StopReport,
};
