//! Persona leakage evaluation.
//!
//! In a STRICT_FACT scene the system prompt must not ask for personality
//! expression. A personality marker counts as leakage unless a negation
//! appears in the 50 characters before it ("No jokes", "avoid sarcasm").

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::Scene;

const PERSONALITY_MARKERS: &[&str] = &[
    "joke", "pun", "sarcasm", "wit", "humorous", "metaphor", "playful", "informal",
];

const NEGATION_WINDOW: usize = 50;

static MARKER_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    PERSONALITY_MARKERS
        .iter()
        .filter_map(|marker| {
            Regex::new(&format!(r"\b{}\b", regex::escape(marker)))
                .ok()
                .map(|re| (*marker, re))
        })
        .collect()
});

static NEGATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b(no|avoid|without|serious|not|don't)\b").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageReport {
    pub status: Verdict,
    pub scene: Scene,
    pub leakage_detected: bool,
    pub findings: Vec<String>,
}

/// Check one system prompt for persona leakage.
pub fn check_leakage(scene: Scene, system_prompt: &str) -> LeakageReport {
    let mut findings = Vec::new();

    if scene == Scene::StrictFact {
        let prompt = system_prompt.to_lowercase();
        for (marker, pattern) in MARKER_PATTERNS.iter() {
            let Some(found) = pattern.find(&prompt) else {
                continue;
            };
            let window = preceding_window(&prompt, found.start());
            let negated = NEGATION.as_ref().is_some_and(|re| re.is_match(window));
            if negated {
                log::debug!("[Evaluation] Marker '{}' negated in '...{}'", marker, window);
            } else {
                findings.push(format!(
                    "Leakage detected: personality instruction '{marker}' found without negation."
                ));
            }
        }
    }

    let leakage_detected = !findings.is_empty();
    LeakageReport {
        status: if leakage_detected {
            Verdict::Fail
        } else {
            Verdict::Pass
        },
        scene,
        leakage_detected,
        findings,
    }
}

/// Up to `NEGATION_WINDOW` characters before byte offset `end`.
fn preceding_window(text: &str, end: usize) -> &str {
    let head = &text[..end];
    let start = head
        .char_indices()
        .rev()
        .nth(NEGATION_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &head[start..]
}

/// Aggregate over a batch of reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub leakage_incidents: usize,
    /// Percentage of passing reports; 0 for an empty batch.
    pub success_rate: f64,
}

pub fn summarize(reports: &[LeakageReport]) -> BatchSummary {
    let total = reports.len();
    let passed = reports.iter().filter(|r| r.status == Verdict::Pass).count();
    let leakage_incidents = reports.iter().filter(|r| r.leakage_detected).count();
    let success_rate = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    };
    BatchSummary {
        total,
        passed,
        failed: total - passed,
        leakage_incidents,
        success_rate,
    }
}
