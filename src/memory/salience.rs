//! Mood-aware retrieval hints for an external memory store.
//!
//! The kernel has no vector store of its own; it only derives filters and
//! a re-ranking from the current affect so a retrieval layer can bias what
//! it recalls.

use serde::{Deserialize, Serialize};

use crate::persona::Pad;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodBias {
    Positive,
    Neutral,
    Melancholic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalIntensity {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFilters {
    pub mood_bias: MoodBias,
    pub retrieval_intensity: RetrievalIntensity,
    /// Arousal widens the search.
    pub top_k_multiplier: f64,
}

pub fn retrieval_filters(affect: Pad) -> RetrievalFilters {
    let mood_bias = if affect.p > 0.4 {
        MoodBias::Positive
    } else if affect.p < -0.4 {
        MoodBias::Melancholic
    } else {
        MoodBias::Neutral
    };
    let retrieval_intensity = if affect.a > 0.5 {
        RetrievalIntensity::High
    } else {
        RetrievalIntensity::Normal
    };
    RetrievalFilters {
        mood_bias,
        retrieval_intensity,
        top_k_multiplier: 1.0 + affect.a.abs() * 0.5,
    }
}

/// A retrieved memory with its relevance score and emotional valence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub pleasure_valence: f64,
}

/// Boost emotionally congruent memories and sort by descending score.
///
/// `score *= 0.8 + 0.4 × (1 − |current_p − valence|)`.
pub fn rerank(mut memories: Vec<RecalledMemory>, current_pleasure: f64) -> Vec<RecalledMemory> {
    for memory in &mut memories {
        let congruence = 1.0 - (current_pleasure - memory.pleasure_valence).abs();
        memory.score *= 0.8 + 0.4 * congruence;
    }
    memories.sort_by(|a, b| b.score.total_cmp(&a.score));
    memories
}
