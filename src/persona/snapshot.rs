//! Persona persistence boundary.
//!
//! A [`PersonaSnapshot`] bundles the FSM (state, counters, intimacy,
//! transition history, affect baseline and current value) with the genome.
//! The on-disk form is plain JSON.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsm::FsmSnapshot;
use super::genome::{Genome, GenomeError};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot contains an invalid genome: {0}")]
    Genome(#[from] GenomeError),

    #[error("unsupported snapshot version: {0}")]
    Version(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub version: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub fsm_state: FsmSnapshot,
    pub genome: Genome,
}

impl PersonaSnapshot {
    pub fn new(label: impl Into<String>, fsm_state: FsmSnapshot, genome: Genome) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            label: label.into(),
            timestamp: Utc::now(),
            fsm_state,
            genome,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        log::info!("[PersonaSnapshot] Snapshot '{}' saved to {}", self.label, path.display());
        Ok(())
    }

    /// Load and validate a snapshot.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let snapshot: PersonaSnapshot = serde_json::from_slice(&fs::read(path)?)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        snapshot.genome.validate()?;
        log::info!("[PersonaSnapshot] Snapshot '{}' loaded from {}", snapshot.label, path.display());
        Ok(snapshot)
    }
}
