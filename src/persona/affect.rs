//! Affective manifold: short-term PAD (pleasure, arousal, dominance) mood.
//!
//! Every axis is clamped to `[-1.0, 1.0]`. Decay moves each axis a fixed
//! fraction of the remaining distance toward its baseline, so repeated
//! decay approaches the baseline exponentially and never overshoots.

use serde::{Deserialize, Serialize};

/// Default fraction of the distance to baseline recovered per decay step.
pub const DEFAULT_DECAY_RATE: f64 = 0.1;

fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

/// Round to `places` decimal places.
pub(crate) fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round() / factor
}

/// A PAD triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    pub p: f64,
    pub a: f64,
    pub d: f64,
}

impl Pad {
    pub const NEUTRAL: Pad = Pad { p: 0.0, a: 0.0, d: 0.0 };

    pub fn new(p: f64, a: f64, d: f64) -> Self {
        Self {
            p: clamp_unit(p),
            a: clamp_unit(a),
            d: clamp_unit(d),
        }
    }

    /// Sum of absolute axis values.
    pub fn magnitude(&self) -> f64 {
        self.p.abs() + self.a.abs() + self.d.abs()
    }

    pub fn rounded(&self, places: i32) -> Pad {
        Pad {
            p: round_to(self.p, places),
            a: round_to(self.a, places),
            d: round_to(self.d, places),
        }
    }
}

/// Sampling warp derived from the current mood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarpFactors {
    /// Multiplies locus variability.
    pub variability_warp: f64,
    /// Added to a range locus default before sampling.
    pub bias_warp: f64,
}

impl Default for WarpFactors {
    /// No warp: variability unchanged, no bias.
    fn default() -> Self {
        Self {
            variability_warp: 1.0,
            bias_warp: 0.0,
        }
    }
}

/// Current mood plus the baseline it decays toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectState {
    current: Pad,
    baseline: Pad,
    decay_rate: f64,
}

impl Default for AffectState {
    fn default() -> Self {
        Self::new(Pad::NEUTRAL)
    }
}

impl AffectState {
    /// Start at `baseline`.
    pub fn new(baseline: Pad) -> Self {
        Self {
            current: baseline,
            baseline,
            decay_rate: DEFAULT_DECAY_RATE,
        }
    }

    pub fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn current(&self) -> Pad {
        self.current
    }

    pub fn baseline(&self) -> Pad {
        self.baseline
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// Replace the baseline and snap the current mood to it.
    pub fn set_baseline(&mut self, baseline: Pad) {
        self.baseline = baseline;
        self.current = baseline;
    }

    /// Inject an emotional pulse.
    pub fn update(&mut self, delta_p: f64, delta_a: f64, delta_d: f64) {
        self.current = Pad::new(
            self.current.p + delta_p,
            self.current.a + delta_a,
            self.current.d + delta_d,
        );
    }

    /// One decay step at the configured rate.
    pub fn decay(&mut self) {
        self.decay_scaled(1.0);
    }

    /// One decay step at `decay_rate × multiplier` (used while LOCKED).
    pub fn decay_scaled(&mut self, multiplier: f64) {
        let rate = (self.decay_rate * multiplier).clamp(0.0, 1.0);
        let c = self.current;
        let b = self.baseline;
        self.current = Pad {
            p: c.p + (b.p - c.p) * rate,
            a: c.a + (b.a - c.a) * rate,
            d: c.d + (b.d - c.d) * rate,
        };
    }

    /// Current mood rounded for display.
    pub fn get_affect(&self) -> Pad {
        self.current.rounded(3)
    }

    pub fn get_warp_factors(&self) -> WarpFactors {
        WarpFactors {
            variability_warp: 1.0 + self.current.a.abs() * 0.5,
            bias_warp: self.current.d * 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_clamps_each_axis() {
        let mut affect = AffectState::default();
        affect.update(0.8, -0.5, 0.0);
        affect.update(0.8, -0.9, 2.5);
        let cur = affect.current();
        assert_eq!(cur.p, 1.0);
        assert_eq!(cur.a, -1.0);
        assert_eq!(cur.d, 1.0);
    }

    #[test]
    fn test_decay_approaches_baseline_without_overshoot() {
        let mut affect = AffectState::new(Pad::new(0.2, 0.0, -0.1));
        affect.update(0.6, 0.8, 0.5);
        let mut prev = affect.current();
        for _ in 0..50 {
            affect.decay();
            let cur = affect.current();
            assert!(cur.p <= prev.p && cur.p >= 0.2);
            assert!(cur.a <= prev.a && cur.a >= 0.0);
            assert!(cur.d <= prev.d && cur.d >= -0.1);
            prev = cur;
        }
        assert!((affect.current().p - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_decay_is_ten_percent_by_default() {
        let mut affect = AffectState::default();
        affect.update(1.0, 0.0, 0.0);
        affect.decay();
        assert!((affect.current().p - 0.9).abs() < 1e-12);

        affect.decay_scaled(0.2);
        assert!((affect.current().p - 0.882).abs() < 1e-12);
    }

    #[test]
    fn test_set_baseline_snaps_current() {
        let mut affect = AffectState::default();
        affect.update(0.5, 0.5, 0.5);
        affect.set_baseline(Pad::new(0.1, 0.2, 0.3));
        assert_eq!(affect.current(), Pad::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_warp_factors() {
        let mut affect = AffectState::default();
        affect.update(0.0, -0.6, 0.5);
        let warp = affect.get_warp_factors();
        assert!((warp.variability_warp - 1.3).abs() < 1e-12);
        assert!((warp.bias_warp - 0.1).abs() < 1e-12);
    }
}
