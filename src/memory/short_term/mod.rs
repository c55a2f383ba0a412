//! Short-term memory with saliency-based eviction.
//!
//! The buffer keeps at most `capacity` entries. When an append overflows
//! it, exactly one entry is evicted: the least salient among all entries
//! except the two most recent, which are immune so the immediate
//! conversational flow is never cut.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona::{Pad, PersonaState};

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Number of newest entries that are never evicted.
pub const PROTECTED_RECENT: usize = 2;

/// An item stored in short-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub state: PersonaState,
    /// Affect snapshot at the time of the interaction.
    pub affect: Pad,
    /// The user input (excerpt) that produced this entry.
    pub user_input: String,
    pub trace_id: String,
}

impl MemoryEntry {
    pub fn new(
        state: PersonaState,
        affect: Pad,
        user_input: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            state,
            affect,
            user_input: user_input.into(),
            trace_id: trace_id.into(),
        }
    }
}

/// `(|p| + |a| + |d| + 0.1) × state weight × recency weight`.
///
/// State weight is 1.5 for LOCKED, DRIFTING and FORMING, else 1.0. Recency
/// grows linearly from 0.5 (oldest) toward 1.0 as `index / total`; a
/// buffer of one entry has recency 1.0.
pub fn saliency(entry: &MemoryEntry, index: usize, total: usize) -> f64 {
    let intensity = entry.affect.magnitude();
    let state_weight = match entry.state {
        PersonaState::Locked | PersonaState::Drifting | PersonaState::Forming => 1.5,
        PersonaState::Stable | PersonaState::Stabilizing => 1.0,
    };
    let recency = if total > 1 {
        0.5 + 0.5 * (index as f64 / total as f64)
    } else {
        1.0
    };
    (intensity + 0.1) * state_weight * recency
}

#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    capacity: usize,
    entries: Vec<MemoryEntry>,
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ShortTermMemory {
    /// Create a buffer. Capacity is raised to at least the protected window.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(PROTECTED_RECENT);
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    /// Append an entry, evicting one if the buffer overflows.
    ///
    /// Returns the reason codes produced (empty when nothing was evicted).
    pub fn add(&mut self, entry: MemoryEntry) -> Vec<String> {
        self.entries.push(entry);
        if self.entries.len() <= self.capacity {
            return Vec::new();
        }
        match self.evict() {
            Some(index) => vec![format!("MEMORY_PRUNED_LOW_SALIENCE_AT_{index}")],
            None => Vec::new(),
        }
    }

    /// Remove the least salient unprotected entry; lowest index wins ties.
    fn evict(&mut self) -> Option<usize> {
        let total = self.entries.len();
        let candidates = total.checked_sub(PROTECTED_RECENT).filter(|n| *n > 0)?;

        let mut min_index = 0;
        let mut min_score = f64::INFINITY;
        for (i, entry) in self.entries[..candidates].iter().enumerate() {
            let score = saliency(entry, i, total);
            if score < min_score {
                min_score = score;
                min_index = i;
            }
        }

        let removed = self.entries.remove(min_index);
        log::debug!(
            "[ShortTermMemory] Evicted entry {} (trace={}, saliency={:.3})",
            min_index,
            removed.trace_id,
            min_score
        );
        Some(min_index)
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
