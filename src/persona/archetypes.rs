//! Stance-to-genome mapping (R.W.C archetypes).
//!
//! A stance is a three-axis summary; this module projects it onto the
//! concrete loci of a genome and onto an affect baseline.

use std::collections::BTreeMap;

use super::affect::{round_to, Pad};
use super::genome::{Distribution, Genome};
use super::stance::Stance;

/// Base weight of `assertive` in the conflict strategy mix.
const ASSERTIVE_BASE: f64 = 0.3;

impl Genome {
    /// Project `stance` onto a copy of this genome.
    ///
    /// - rigor scales `logical_rigor` and `explanation_depth` across their range
    /// - warmth sets `identity_signature`
    /// - chaos scales `humor_density`, and every locus gets
    ///   variability `0.05 + 0.4 × chaos`
    /// - `conflict_strategy` weights become proportional to
    ///   (rigor, warmth, 0.3), rounded to 2 decimals
    ///
    /// Mapped loci are set absolutely, so the result does not depend on
    /// their previous defaults and applying a stance twice is a no-op.
    /// Loci the stance does not map keep their current value, including
    /// any feedback drift.
    pub fn with_stance(&self, stance: Stance) -> Genome {
        let Stance {
            rigor: r,
            warmth: w,
            chaos: c,
        } = stance.clamped();

        let mut next = self.clone();
        for locus in &mut next.loci {
            match (locus.id.as_str(), &mut locus.distribution) {
                ("logical_rigor" | "explanation_depth", Distribution::Range { min, max, default }) => {
                    *default = *min + (*max - *min) * r;
                }
                ("identity_signature", Distribution::Range { min, max, default }) => {
                    *default = w.clamp(*min, *max);
                }
                ("humor_density", Distribution::Range { min, max, default }) => {
                    *default = *min + (*max - *min) * c;
                }
                ("conflict_strategy", Distribution::Categorical { values }) => {
                    let total = r + w + ASSERTIVE_BASE;
                    *values = BTreeMap::from([
                        ("analytical".to_string(), round_to(r / total, 2)),
                        ("accommodating".to_string(), round_to(w / total, 2)),
                        ("assertive".to_string(), round_to(ASSERTIVE_BASE / total, 2)),
                    ]);
                }
                _ => {}
            }
            locus.variability = 0.05 + 0.4 * c;
        }
        next
    }
}

/// Emotional baseline implied by a stance (3 decimals).
///
/// Warmth lifts pleasure, chaos lifts arousal, rigor lifts dominance.
pub fn affect_baseline(stance: Stance) -> Pad {
    let s = stance.clamped();
    Pad::new(
        round_to(s.warmth * 0.8 - 0.2, 3),
        round_to(s.chaos * 0.7 - 0.1, 3),
        round_to(s.rigor * 0.6 - 0.1, 3),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::genome::{Locus, LocusCategory, FEEDBACK_MULTIPLIER};

    fn default_of(genome: &Genome, id: &str) -> f64 {
        genome.locus(id).unwrap().range_default().unwrap()
    }

    #[test]
    fn test_factual_stance_mapping() {
        let base = Genome::standard("p");
        let g = base.with_stance(Stance::new(0.9, 0.2, 0.1));

        assert!((default_of(&g, "logical_rigor") - 0.9).abs() < 1e-12);
        assert!((default_of(&g, "explanation_depth") - 0.9).abs() < 1e-12);
        assert!((default_of(&g, "identity_signature") - 0.2).abs() < 1e-12);
        assert!((default_of(&g, "humor_density") - 0.1).abs() < 1e-12);
        for locus in &g.loci {
            assert!((locus.variability - 0.09).abs() < 1e-12);
        }

        let Distribution::Categorical { values } = &g.locus("conflict_strategy").unwrap().distribution
        else {
            panic!("conflict_strategy must stay categorical");
        };
        // total = 1.4
        assert_eq!(values["analytical"], 0.64);
        assert_eq!(values["accommodating"], 0.14);
        assert_eq!(values["assertive"], 0.21);

        // The source genome is untouched.
        assert_eq!(base, Genome::standard("p"));
    }

    #[test]
    fn test_stance_overrides_mapped_loci_and_keeps_the_rest() {
        let mut base = Genome::standard("p");
        base.loci.push(Locus::range(
            "verbosity",
            LocusCategory::Style,
            (0.0, 1.0, 0.5),
            0.2,
        ));
        let feedback = BTreeMap::from([
            ("verbosity".to_string(), 1.0),
            ("logical_rigor".to_string(), 1.0),
        ]);
        let drifted = base.with_feedback(&feedback, FEEDBACK_MULTIPLIER);
        assert!((default_of(&drifted, "verbosity") - 0.52).abs() < 1e-9);

        let stance = Stance::new(0.9, 0.2, 0.1);
        let g = drifted.with_stance(stance);
        assert!((default_of(&g, "logical_rigor") - 0.9).abs() < 1e-12);
        assert!((default_of(&g, "verbosity") - 0.52).abs() < 1e-9);
        assert_eq!(g.with_stance(stance), g);
    }

    #[test]
    fn test_stance_is_clamped() {
        let g = Genome::standard("p").with_stance(Stance::new(2.0, -1.0, 0.0));
        assert_eq!(default_of(&g, "logical_rigor"), 1.0);
        assert_eq!(default_of(&g, "identity_signature"), 0.0);
    }

    #[test]
    fn test_affect_baseline() {
        let pad = affect_baseline(Stance::new(0.3, 0.9, 0.4));
        assert_eq!(pad, Pad::new(0.52, 0.18, 0.08));
    }
}
