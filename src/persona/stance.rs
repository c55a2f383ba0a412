//! Behavioral stance (rigor, warmth, chaos) and the drift controller that
//! keeps observed output close to the target stance.
//!
//! The controller keeps a rolling window of recent persona outputs, scores
//! them against three fixed marker vocabularies, and turns large deviations
//! from the target stance into governance directives.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::affect::round_to;

/// Default rolling window capacity.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
/// Default per-axis drift threshold.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.3;

const WARMTH_MARKERS: &[&str] = &[
    "sorry", "happy", "love", "feel", "great", "please", "thanks", "friend", "support", "😊", "❤️",
    "👍", "appreciate",
];

const RIGOR_MARKERS: &[&str] = &[
    "therefore",
    "because",
    "calculate",
    "logic",
    "proof",
    "step-by-step",
    "analysis",
    "statistically",
    "evidence",
    "fact",
    "1",
    "2",
    "3",
];

const CHAOS_MARKERS: &[&str] = &[
    "maybe", "perhaps", "weird", "random", "dream", "imagine", "wild", "matrix", "cyber",
    "entropy", "chaos",
];

pub const DIRECTIVE_INCREASE_RIGOR: &str =
    "CRITICAL: Output lacks Rigor. Increase logical structure and show the reasoning behind each claim.";
pub const DIRECTIVE_RELAX: &str =
    "NOTICE: Output is overly rigid. Relax formality and keep explanations approachable.";
pub const DIRECTIVE_INCREASE_DISTANCE: &str =
    "NOTICE: Output is overly familiar. Increase professional distance.";
pub const DIRECTIVE_FORCE_DETERMINISM: &str =
    "CRITICAL: Hallucination/Instability detected. Force determinism and stay on verifiable statements.";

// ---------------------------------------------------------------------------
// Stance
// ---------------------------------------------------------------------------

/// Rigor / warmth / chaos triple, each in `[0, 1]` when used as a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stance {
    pub rigor: f64,
    pub warmth: f64,
    pub chaos: f64,
}

impl Stance {
    /// 0.5 on every axis.
    pub const NEUTRAL: Stance = Stance {
        rigor: 0.5,
        warmth: 0.5,
        chaos: 0.5,
    };

    pub const fn new(rigor: f64, warmth: f64, chaos: f64) -> Self {
        Self {
            rigor,
            warmth,
            chaos,
        }
    }

    /// Copy with every axis clamped to `[0, 1]`.
    pub fn clamped(&self) -> Stance {
        Stance {
            rigor: self.rigor.clamp(0.0, 1.0),
            warmth: self.warmth.clamp(0.0, 1.0),
            chaos: self.chaos.clamp(0.0, 1.0),
        }
    }
}

impl Default for Stance {
    fn default() -> Self {
        Stance::NEUTRAL
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

fn marker_score(markers: &[&str], text: &str, words: usize) -> f64 {
    let hits = markers.iter().filter(|m| text.contains(*m)).count();
    let density = hits as f64 / words.max(1) as f64;
    round_to((density * 20.0).min(1.0), 2)
}

/// Observed stance of a batch of outputs.
///
/// Each axis counts the distinct markers present in the lowercased, joined
/// text; score = `min(hits / words × 20, 1)`, rounded to 2 decimals.
/// Empty input is neutral.
pub fn analyze_history<S: AsRef<str>>(entries: &[S]) -> Stance {
    if entries.is_empty() {
        return Stance::NEUTRAL;
    }
    let combined = entries
        .iter()
        .map(|e| e.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let words = combined.split_whitespace().count();
    if words == 0 {
        return Stance::NEUTRAL;
    }
    Stance {
        rigor: marker_score(RIGOR_MARKERS, &combined, words),
        warmth: marker_score(WARMTH_MARKERS, &combined, words),
        chaos: marker_score(CHAOS_MARKERS, &combined, words),
    }
}

/// `observed − target` per axis, rounded to 2 decimals.
pub fn calculate_drift(target: Stance, observed: Stance) -> Stance {
    Stance {
        rigor: round_to(observed.rigor - target.rigor, 2),
        warmth: round_to(observed.warmth - target.warmth, 2),
        chaos: round_to(observed.chaos - target.chaos, 2),
    }
}

/// Directives triggered by a drift vector, in a fixed order.
pub fn corrections(drift: Stance, threshold: f64) -> Vec<&'static str> {
    let mut directives = Vec::new();
    if drift.rigor < -threshold {
        directives.push(DIRECTIVE_INCREASE_RIGOR);
    } else if drift.rigor > threshold {
        directives.push(DIRECTIVE_RELAX);
    }
    if drift.warmth > threshold {
        directives.push(DIRECTIVE_INCREASE_DISTANCE);
    }
    if drift.chaos > threshold {
        directives.push(DIRECTIVE_FORCE_DETERMINISM);
    }
    directives
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Result of one drift check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub target: Stance,
    pub observed: Stance,
    pub drift: Stance,
    /// Joined directives, `None` when nothing triggered.
    pub correction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StanceDriftController {
    window: VecDeque<String>,
    capacity: usize,
    threshold: f64,
}

impl Default for StanceDriftController {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW, DEFAULT_DRIFT_THRESHOLD)
    }
}

impl StanceDriftController {
    pub fn new(capacity: usize, threshold: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    /// Remember one persona output, dropping the oldest at capacity.
    pub fn record_output(&mut self, text: impl Into<String>) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(text.into());
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.window.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn observed(&self) -> Stance {
        let entries: Vec<&str> = self.history().collect();
        analyze_history(&entries)
    }

    /// Compare the window against `target`.
    ///
    /// Returns `None` when the window is empty: with nothing observed there
    /// is nothing to correct.
    pub fn check(&self, target: Stance) -> Option<DriftReport> {
        if self.window.is_empty() {
            return None;
        }
        let observed = self.observed();
        let drift = calculate_drift(target, observed);
        let directives = corrections(drift, self.threshold);
        let correction = (!directives.is_empty()).then(|| directives.join("\n"));
        if correction.is_some() {
            log::info!(
                "[StanceDrift] Drift detected: target={:?} observed={:?} drift={:?}",
                target,
                observed,
                drift
            );
        }
        Some(DriftReport {
            target,
            observed,
            drift,
            correction,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_is_neutral_and_drift_free() {
        let observed = analyze_history::<&str>(&[]);
        assert_eq!(observed, Stance::NEUTRAL);
        let drift = calculate_drift(Stance::NEUTRAL, observed);
        assert_eq!(drift, Stance::new(0.0, 0.0, 0.0));
        assert!(corrections(drift, DEFAULT_DRIFT_THRESHOLD).is_empty());
        assert!(StanceDriftController::default().check(Stance::NEUTRAL).is_none());
    }

    #[test]
    fn test_marker_density_scoring() {
        // 10 words, two distinct chaos markers: 2 / 10 * 20 = 4 -> capped at 1.0.
        let observed = analyze_history(&["maybe the matrix is a strange place to be today"]);
        assert_eq!(observed.chaos, 1.0);
        assert_eq!(observed.rigor, 0.0);

        // 40 words, one warmth marker: 1 / 40 * 20 = 0.5.
        let filler = vec!["word"; 39].join(" ");
        let observed = analyze_history(&[format!("thanks {filler}")]);
        assert_eq!(observed.warmth, 0.5);
    }

    #[test]
    fn test_markers_count_once_each() {
        let observed = analyze_history(&[vec!["maybe"; 40].join(" ")]);
        // 40 words, one distinct marker.
        assert_eq!(observed.chaos, 0.5);
    }

    #[test]
    fn test_chaotic_output_forces_determinism() {
        let mut ctl = StanceDriftController::default();
        ctl.record_output("Maybe we are all in a weird dream, imagine the wild entropy!");
        let report = ctl.check(Stance::new(0.9, 0.2, 0.1)).unwrap();
        let correction = report.correction.unwrap();
        assert!(correction.contains("CRITICAL: Hallucination/Instability detected"));
        assert!(correction.contains("lacks Rigor"));
        assert_eq!(correction.lines().count(), 2);
    }

    #[test]
    fn test_rigid_and_warm_directives() {
        let drift = Stance::new(0.4, 0.35, 0.0);
        assert_eq!(
            corrections(drift, 0.3),
            vec![DIRECTIVE_RELAX, DIRECTIVE_INCREASE_DISTANCE]
        );
        // At the threshold nothing fires.
        assert!(corrections(Stance::new(0.3, 0.3, 0.3), 0.3).is_empty());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut ctl = StanceDriftController::new(3, 0.3);
        for i in 0..5 {
            ctl.record_output(format!("out {i}"));
        }
        let kept: Vec<&str> = ctl.history().collect();
        assert_eq!(kept, vec!["out 2", "out 3", "out 4"]);
    }
}
