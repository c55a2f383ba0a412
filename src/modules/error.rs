//! Module registry errors.

use thiserror::Error;

/// Errors that can occur while looking up or stopping kernel modules.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Module not found.
    #[error("Module not found: {0}")]
    NotFound(String),

    /// A module with the same name is already registered.
    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    /// A lifecycle hook (stop) failed.
    #[error("Module {module} failed to stop: {reason}")]
    Stop { module: String, reason: String },

    /// Runtime error raised by a module.
    #[error("Runtime error: {0}")]
    Runtime(String),
}
