//! Persona genome: the ordered list of trait loci the sampler draws from.
//!
//! A [`Genome`] is an immutable value. Every update (stance mapping,
//! feedback drift, recombination) returns a new genome, and the runtime
//! swaps its `Arc<Genome>` wholesale, so the sampler and the FSM can
//! never observe a half-updated trait list.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::affect::round_to;

/// Loci that recombination never mutates.
pub const SAFETY_ANCHORS: [&str; 2] = ["truth_alignment", "logic_gate"];

/// Default global factor applied by [`Genome::with_feedback`].
pub const FEEDBACK_MULTIPLIER: f64 = 0.1;

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("genome has no loci")]
    Empty,

    #[error("invalid locus '{id}': {reason}")]
    InvalidLocus { id: String, reason: String },

    #[error("duplicate locus id: {0}")]
    DuplicateLocus(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Locus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocusCategory {
    Cognitive,
    Value,
    Style,
    Domain,
}

/// Sampling distribution of a locus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Range { min: f64, max: f64, default: f64 },
    /// Label -> probability weight. Ordered so weighted draws are stable.
    Categorical { values: BTreeMap<String, f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locus {
    pub id: String,
    pub category: LocusCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_variability")]
    pub variability: f64,
    pub distribution: Distribution,
}

fn default_weight() -> f64 {
    1.0
}

fn default_variability() -> f64 {
    0.5
}

impl Locus {
    pub fn range(
        id: impl Into<String>,
        category: LocusCategory,
        (min, max, default): (f64, f64, f64),
        variability: f64,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            description: String::new(),
            weight: 1.0,
            variability,
            distribution: Distribution::Range { min, max, default },
        }
    }

    pub fn categorical(
        id: impl Into<String>,
        category: LocusCategory,
        values: &[(&str, f64)],
        variability: f64,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            description: String::new(),
            weight: 1.0,
            variability,
            distribution: Distribution::Categorical {
                values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Default value of a range locus.
    pub fn range_default(&self) -> Option<f64> {
        match self.distribution {
            Distribution::Range { default, .. } => Some(default),
            Distribution::Categorical { .. } => None,
        }
    }

    /// Copy with the range default replaced (clamped to the bounds).
    /// Categorical loci are returned unchanged.
    pub(crate) fn with_range_default(&self, value: f64) -> Locus {
        let mut locus = self.clone();
        if let Distribution::Range { min, max, default } = &mut locus.distribution {
            *default = value.clamp(*min, *max);
        }
        locus
    }

    fn validate(&self) -> Result<(), GenomeError> {
        let invalid = |reason: String| GenomeError::InvalidLocus {
            id: self.id.clone(),
            reason,
        };
        if self.id.trim().is_empty() {
            return Err(invalid("empty id".into()));
        }
        if !(self.variability.is_finite() && self.variability >= 0.0) {
            return Err(invalid(format!("variability {} must be >= 0", self.variability)));
        }
        match &self.distribution {
            Distribution::Range { min, max, default } => {
                if !(min <= default && default <= max) {
                    return Err(invalid(format!(
                        "default {default} outside range [{min}, {max}]"
                    )));
                }
            }
            Distribution::Categorical { values } => {
                if values.values().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(invalid("categorical weights must be >= 0".into()));
                }
                if values.values().sum::<f64>() <= 0.0 {
                    return Err(invalid("categorical weights must sum to > 0".into()));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Genome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub version: String,
    pub persona_id: String,
    /// Persona ids of the parents when produced by recombination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    pub loci: Vec<Locus>,
}

impl Genome {
    /// The built-in six-locus genome.
    pub fn standard(persona_id: impl Into<String>) -> Self {
        use LocusCategory::*;
        Self {
            version: "1.0".into(),
            persona_id: persona_id.into(),
            parents: Vec::new(),
            loci: vec![
                Locus::range("explanation_depth", Cognitive, (0.0, 1.0, 0.5), 0.2)
                    .with_description("Preferred depth of explanations"),
                Locus::range("humor_density", Style, (0.0, 1.0, 0.3), 0.2)
                    .with_description("How often humor surfaces in replies"),
                Locus::categorical(
                    "conflict_strategy",
                    Value,
                    &[("accommodating", 0.4), ("analytical", 0.4), ("assertive", 0.2)],
                    0.2,
                )
                .with_description("Tendency when the user pushes back"),
                Locus::range("logical_rigor", Cognitive, (0.0, 1.0, 0.7), 0.2)
                    .with_description("Tendency to show reasoning steps"),
                Locus::categorical(
                    "topic_attractors",
                    Domain,
                    &[
                        ("cybernetics", 0.35),
                        ("space_exploration", 0.4),
                        ("vintage_computing", 0.25),
                    ],
                    0.2,
                )
                .with_description("Interests that flavor examples"),
                Locus::range("identity_signature", Style, (0.0, 1.0, 0.5), 0.2)
                    .with_description("Directness versus warmth of voice"),
            ],
        }
    }

    /// Parse and validate a genome from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, GenomeError> {
        let genome: Genome = serde_json::from_str(json)?;
        genome.validate()?;
        Ok(genome)
    }

    pub fn validate(&self) -> Result<(), GenomeError> {
        if self.loci.is_empty() {
            return Err(GenomeError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for locus in &self.loci {
            if !seen.insert(locus.id.as_str()) {
                return Err(GenomeError::DuplicateLocus(locus.id.clone()));
            }
            locus.validate()?;
        }
        Ok(())
    }

    pub fn locus(&self, id: &str) -> Option<&Locus> {
        self.loci.iter().find(|l| l.id == id)
    }

    /// Apply user feedback (locus id -> delta in `[-1, 1]`) to range defaults:
    /// `default += feedback × variability × multiplier`, clamped, 4 decimals.
    pub fn with_feedback(&self, feedback: &BTreeMap<String, f64>, multiplier: f64) -> Genome {
        let mut next = self.clone();
        for locus in &mut next.loci {
            let (Some(delta), Some(current)) = (feedback.get(&locus.id), locus.range_default())
            else {
                continue;
            };
            let shift = delta * locus.variability * multiplier;
            let drifted = locus.with_range_default(round_to(current + shift, 4));
            log::debug!(
                "[Genome] Drifting '{}': {} -> {:?} (var: {})",
                locus.id,
                current,
                drifted.range_default(),
                locus.variability
            );
            *locus = drifted;
        }
        next
    }

    /// Cross two parents into a child genome.
    ///
    /// Loci present in both parents take their metadata from a randomly
    /// chosen parent; range defaults are averaged. Loci present in only one
    /// parent are inherited as-is. Every non-anchor locus then mutates with
    /// probability `mutation_rate` by a uniform offset in `[-0.1, 0.1]`.
    /// All randomness comes from `seed`.
    pub fn recombine(
        a: &Genome,
        b: &Genome,
        child_id: impl Into<String>,
        mutation_rate: f64,
        seed: u64,
    ) -> Genome {
        let mut rng = StdRng::seed_from_u64(seed);
        let b_by_id: HashMap<&str, &Locus> = b.loci.iter().map(|l| (l.id.as_str(), l)).collect();

        let mut ordered: Vec<&Locus> = a.loci.iter().collect();
        ordered.extend(b.loci.iter().filter(|l| a.locus(&l.id).is_none()));

        let mut loci = Vec::with_capacity(ordered.len());
        for candidate in ordered {
            let mut locus = match (a.locus(&candidate.id), b_by_id.get(candidate.id.as_str())) {
                (Some(la), Some(lb)) => {
                    let picked = if rng.gen_bool(0.5) { la } else { lb };
                    match (la.range_default(), lb.range_default()) {
                        (Some(da), Some(db)) => picked.with_range_default((da + db) / 2.0),
                        _ => picked.clone(),
                    }
                }
                _ => candidate.clone(),
            };

            if !SAFETY_ANCHORS.contains(&locus.id.as_str()) && rng.gen::<f64>() < mutation_rate {
                if let Some(current) = locus.range_default() {
                    let drift: f64 = rng.gen_range(-0.1..=0.1);
                    log::debug!("[Genome] Mutation: locus '{}' drifted by {:.3}", locus.id, drift);
                    locus = locus.with_range_default(current + drift);
                }
            }
            loci.push(locus);
        }

        Genome {
            version: a.version.clone(),
            persona_id: child_id.into(),
            parents: vec![a.persona_id.clone(), b.persona_id.clone()],
            loci,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_genome_is_valid() {
        let genome = Genome::standard("pioneer_v2");
        genome.validate().unwrap();
        let ids: Vec<&str> = genome.loci.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "explanation_depth",
                "humor_density",
                "conflict_strategy",
                "logical_rigor",
                "topic_attractors",
                "identity_signature"
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_loci() {
        let mut genome = Genome::standard("p");
        genome.loci[0] = Locus::range("explanation_depth", LocusCategory::Cognitive, (0.0, 1.0, 1.5), 0.2);
        assert!(matches!(genome.validate(), Err(GenomeError::InvalidLocus { .. })));

        let mut genome = Genome::standard("p");
        genome.loci[2] = Locus::categorical("conflict_strategy", LocusCategory::Value, &[("a", 0.0)], 0.2);
        assert!(genome.validate().is_err());

        let mut genome = Genome::standard("p");
        genome.loci.push(genome.loci[0].clone());
        assert!(matches!(genome.validate(), Err(GenomeError::DuplicateLocus(_))));

        let empty = Genome { loci: vec![], ..Genome::standard("p") };
        assert!(matches!(empty.validate(), Err(GenomeError::Empty)));
    }

    #[test]
    fn test_json_round_trip_and_tagging() {
        let genome = Genome::standard("p");
        let json = serde_json::to_string(&genome).unwrap();
        assert!(json.contains("\"type\":\"range\""));
        assert!(json.contains("\"type\":\"categorical\""));
        assert_eq!(Genome::from_json_str(&json).unwrap(), genome);
    }

    #[test]
    fn test_feedback_moves_defaults_without_touching_source() {
        let genome = Genome::standard("p");
        let feedback = BTreeMap::from([
            ("explanation_depth".to_string(), 0.5),
            ("humor_density".to_string(), -0.8),
            ("conflict_strategy".to_string(), 1.0),
        ]);
        let next = genome.with_feedback(&feedback, FEEDBACK_MULTIPLIER);

        // 0.5 + 0.5 * 0.2 * 0.1 = 0.51; 0.3 - 0.8 * 0.2 * 0.1 = 0.284
        assert_eq!(next.locus("explanation_depth").unwrap().range_default(), Some(0.51));
        assert_eq!(next.locus("humor_density").unwrap().range_default(), Some(0.284));
        assert_eq!(next.locus("conflict_strategy"), genome.locus("conflict_strategy"));
        assert_eq!(genome.locus("explanation_depth").unwrap().range_default(), Some(0.5));
    }

    #[test]
    fn test_feedback_clamps_to_bounds() {
        let mut genome = Genome::standard("p");
        genome.loci[0] = Locus::range("explanation_depth", LocusCategory::Cognitive, (0.0, 1.0, 0.99), 1.0);
        let feedback = BTreeMap::from([("explanation_depth".to_string(), 1.0)]);
        let next = genome.with_feedback(&feedback, 1.0);
        assert_eq!(next.locus("explanation_depth").unwrap().range_default(), Some(1.0));
    }

    #[test]
    fn test_recombine_averages_and_is_seeded() {
        let mut a = Genome::standard("alpha");
        let mut b = Genome::standard("beta");
        a.loci[0] = a.loci[0].with_range_default(0.2);
        b.loci[0] = b.loci[0].with_range_default(0.8);
        b.loci.push(Locus::range("logic_gate", LocusCategory::Value, (0.0, 1.0, 0.9), 0.1));

        let child = Genome::recombine(&a, &b, "child", 0.0, 42);
        assert_eq!(child.persona_id, "child");
        assert_eq!(child.parents, vec!["alpha", "beta"]);
        assert_eq!(child.loci.len(), 7);
        assert_eq!(child.locus("explanation_depth").unwrap().range_default(), Some(0.5));
        assert_eq!(child.locus("logic_gate").unwrap().range_default(), Some(0.9));

        let again = Genome::recombine(&a, &b, "child", 0.5, 7);
        assert_eq!(again, Genome::recombine(&a, &b, "child", 0.5, 7));
    }

    #[test]
    fn test_safety_anchors_never_mutate() {
        let a = Genome {
            loci: vec![
                Locus::range("truth_alignment", LocusCategory::Value, (0.0, 1.0, 1.0), 0.1),
                Locus::range("logic_gate", LocusCategory::Value, (0.0, 1.0, 0.5), 0.1),
            ],
            ..Genome::standard("a")
        };
        for seed in 0..20 {
            let child = Genome::recombine(&a, &a, "c", 1.0, seed);
            assert_eq!(child.locus("truth_alignment").unwrap().range_default(), Some(1.0));
            assert_eq!(child.locus("logic_gate").unwrap().range_default(), Some(0.5));
        }
    }
}
