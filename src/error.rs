//! Crate-level error type.

use thiserror::Error;

use crate::events::{BusError, EventLogError};
use crate::memory::JournalError;
use crate::modules::ModuleError;
use crate::persona::{GenomeError, SamplingError, SnapshotError};
use crate::pipeline::{PipelineError, StepError};
use crate::utilities::ConfigError;

/// Any error the kernel surfaces to its caller.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Genome(#[from] GenomeError),

    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;
