//! Deterministic trait sampler.
//!
//! Draws are seeded from `md5("{session}_{bucket}") mod 2^32`, where the
//! bucket is `floor(unix_secs / bucket_size)`. The same session therefore
//! sees the same personality within one bucket window, and a fresh draw
//! once the bucket rolls over. Nothing here touches unseeded randomness.

use std::fmt;

use chrono::Utc;
use md5::{Digest, Md5};
use rand::distributions::{Distribution as _, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::affect::WarpFactors;
use super::genome::{Distribution, Locus};

/// Default bucket size: one hour.
pub const DEFAULT_TIME_BUCKET_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("locus '{id}' has an empty range [{min}, {max}]")]
    InvalidRange { id: String, min: f64, max: f64 },

    #[error("locus '{id}' has unusable categorical weights: {source}")]
    InvalidWeights {
        id: String,
        #[source]
        source: rand::distributions::WeightedError,
    },
}

/// A sampled trait value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitValue {
    Scalar(f64),
    Label(String),
}

impl TraitValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraitValue::Scalar(v) => Some(*v),
            TraitValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            TraitValue::Scalar(_) => None,
            TraitValue::Label(s) => Some(s),
        }
    }
}

impl fmt::Display for TraitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitValue::Scalar(v) => write!(f, "{v:.3}"),
            TraitValue::Label(s) => f.write_str(s),
        }
    }
}

/// Sampled values in genome order.
pub type Projection = Vec<(String, TraitValue)>;

/// 32-bit seed for a session within a time bucket.
pub fn session_seed(session_id: &str, bucket: u64) -> u64 {
    let digest = Md5::digest(format!("{session_id}_{bucket}").as_bytes());
    // Big-endian digest modulo 2^32 is its last four bytes.
    u32::from_be_bytes([digest[12], digest[13], digest[14], digest[15]]) as u64
}

#[derive(Debug, Clone)]
pub struct DeterministicSampler {
    time_bucket_secs: u64,
}

impl Default for DeterministicSampler {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_BUCKET_SECS)
    }
}

impl DeterministicSampler {
    pub fn new(time_bucket_secs: u64) -> Self {
        Self {
            time_bucket_secs: time_bucket_secs.max(1),
        }
    }

    pub fn time_bucket_secs(&self) -> u64 {
        self.time_bucket_secs
    }

    /// Bucket containing the current wall-clock time.
    pub fn current_bucket(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64 / self.time_bucket_secs
    }

    /// Sample `locus` for `session_id` in the current bucket, or with
    /// `manual_seed` when one is given.
    pub fn sample_trait(
        &self,
        locus: &Locus,
        session_id: &str,
        influence: f64,
        warp: WarpFactors,
        manual_seed: Option<u64>,
    ) -> Result<TraitValue, SamplingError> {
        let seed = match manual_seed {
            Some(seed) => seed,
            None => session_seed(session_id, self.current_bucket()),
        };
        sample_with_seed(locus, seed, influence, warp)
    }

    /// Sample with an explicit time bucket.
    pub fn sample_trait_in_bucket(
        &self,
        locus: &Locus,
        session_id: &str,
        bucket: u64,
        influence: f64,
        warp: WarpFactors,
    ) -> Result<TraitValue, SamplingError> {
        sample_with_seed(locus, session_seed(session_id, bucket), influence, warp)
    }
}

/// Core draw. Each call builds its own generator from `seed`.
pub fn sample_with_seed(
    locus: &Locus,
    seed: u64,
    influence: f64,
    warp: WarpFactors,
) -> Result<TraitValue, SamplingError> {
    let mut rng = StdRng::seed_from_u64(seed);
    match &locus.distribution {
        Distribution::Range { min, max, default } => {
            let (min, max) = (*min, *max);
            if !(min <= max) {
                return Err(SamplingError::InvalidRange {
                    id: locus.id.clone(),
                    min,
                    max,
                });
            }
            let draw = rng.gen_range(min..=max);
            let effective_default = (default + warp.bias_warp).clamp(min, max);
            let effective_variability = locus.variability * warp.variability_warp;
            let value =
                effective_default + (draw - effective_default) * influence * effective_variability;
            Ok(TraitValue::Scalar(value.clamp(min, max)))
        }
        Distribution::Categorical { values } => {
            let index = WeightedIndex::new(values.values().copied()).map_err(|source| {
                SamplingError::InvalidWeights {
                    id: locus.id.clone(),
                    source,
                }
            })?;
            let picked = index.sample(&mut rng);
            // WeightedIndex only yields indices < values.len().
            let label = values.keys().nth(picked).cloned().unwrap_or_default();
            Ok(TraitValue::Label(label))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::genome::{Genome, LocusCategory};

    fn depth() -> Locus {
        Locus::range("explanation_depth", LocusCategory::Cognitive, (0.0, 1.0, 0.35), 0.5)
    }

    #[test]
    fn test_same_session_and_bucket_is_deterministic() {
        let sampler = DeterministicSampler::default();
        let warp = WarpFactors {
            variability_warp: 1.2,
            bias_warp: 0.05,
        };
        for locus in Genome::standard("p").loci {
            let a = sampler.sample_trait_in_bucket(&locus, "session_42", 480_000, 0.8, warp).unwrap();
            let b = sampler.sample_trait_in_bucket(&locus, "session_42", 480_000, 0.8, warp).unwrap();
            assert_eq!(a, b, "locus {}", locus.id);
        }
    }

    #[test]
    fn test_seed_changes_with_bucket_and_session() {
        let base = session_seed("session_42", 100);
        assert_eq!(base, session_seed("session_42", 100));
        assert_ne!(base, session_seed("session_42", 101));
        assert_ne!(base, session_seed("session_99", 100));
        assert!(base < (1u64 << 32));
    }

    #[test]
    fn test_manual_seed_overrides_time_bucket() {
        let sampler = DeterministicSampler::default();
        let a = sampler
            .sample_trait(&depth(), "a", 1.0, WarpFactors::default(), Some(7))
            .unwrap();
        let b = sampler
            .sample_trait(&depth(), "completely-different", 1.0, WarpFactors::default(), Some(7))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_influence_returns_effective_default() {
        let value = sample_with_seed(&depth(), 1, 0.0, WarpFactors::default()).unwrap();
        assert_eq!(value, TraitValue::Scalar(0.35));

        let biased = sample_with_seed(
            &depth(),
            1,
            0.0,
            WarpFactors {
                variability_warp: 1.0,
                bias_warp: 0.9,
            },
        )
        .unwrap();
        assert_eq!(biased, TraitValue::Scalar(1.0));
    }

    #[test]
    fn test_range_values_stay_in_bounds() {
        let warp = WarpFactors {
            variability_warp: 1.5,
            bias_warp: 0.2,
        };
        for seed in 0..200 {
            let v = sample_with_seed(&depth(), seed, 1.0, warp).unwrap().as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v));
            // |value - default| <= |draw - default| * 0.75 <= 0.75
            assert!((v - 0.55).abs() <= 0.75 + 1e-12);
        }
    }

    #[test]
    fn test_categorical_draws_known_labels() {
        let locus = Locus::categorical(
            "conflict_strategy",
            LocusCategory::Value,
            &[("analytical", 1.0), ("assertive", 0.0)],
            0.2,
        );
        for seed in 0..50 {
            let v = sample_with_seed(&locus, seed, 1.0, WarpFactors::default()).unwrap();
            assert_eq!(v, TraitValue::Label("analytical".into()));
        }
    }

    #[test]
    fn test_invalid_loci_are_errors() {
        let bad_range = Locus::range("x", LocusCategory::Style, (1.0, 0.0, 0.5), 0.1);
        assert!(matches!(
            sample_with_seed(&bad_range, 1, 1.0, WarpFactors::default()),
            Err(SamplingError::InvalidRange { .. })
        ));
        let bad_weights = Locus::categorical("y", LocusCategory::Style, &[("a", 0.0)], 0.1);
        assert!(matches!(
            sample_with_seed(&bad_weights, 1, 1.0, WarpFactors::default()),
            Err(SamplingError::InvalidWeights { .. })
        ));
    }
}
