//! Memory for a persona session.
//!
//! Short-term memory is the saliency-ranked buffer the pipeline feeds each
//! cycle. The reflection journal is an optional append-only log of persona
//! evolution, and `salience` turns the current mood into retrieval hints.

pub mod journal;
pub mod salience;
pub mod short_term;

pub use journal::{JournalEntry, JournalError, ReflectionJournal};
pub use salience::{
    rerank, retrieval_filters, MoodBias, RecalledMemory, RetrievalFilters, RetrievalIntensity,
};
pub use short_term::{MemoryEntry, ShortTermMemory};
