//! Turns a trait projection into structured system-prompt instructions.
//!
//! Each known trait maps to a prompt section. Range traits pick the first
//! band containing the sampled value; categorical traits map by label.
//! Sections are emitted in a fixed priority order and empty sections are
//! omitted.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use super::sampler::{Projection, TraitValue};

/// Below this influence the optional flavor section is dropped.
pub const FLAVOR_MIN_INFLUENCE: f64 = 0.3;
/// Below this intimacy simple analogies are replaced by a neutral tone.
pub const ANALOGY_MIN_INTIMACY: f64 = 0.4;
/// Below this intimacy topic attractors are reduced to a mild mention.
pub const ATTRACTOR_MIN_INTIMACY: f64 = 0.5;

const ROLE_TEXT: &str = "You are an intelligent AI assistant governed by a dynamic persona engine.";
const NEUTRAL_TONE: &str = "Maintain a standard, polite, and helpful tone.";

/// Prompt sections, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Role,
    Mission,
    Policies,
    Style,
    OutputFormat,
    OptionalFlavor,
}

impl Section {
    pub const ORDER: [Section; 6] = [
        Section::Role,
        Section::Mission,
        Section::Policies,
        Section::Style,
        Section::OutputFormat,
        Section::OptionalFlavor,
    ];
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Section::Role => "ROLE",
            Section::Mission => "MISSION",
            Section::Policies => "POLICIES",
            Section::Style => "STYLE",
            Section::OutputFormat => "OUTPUT_FORMAT",
            Section::OptionalFlavor => "OPTIONAL_FLAVOR",
        };
        f.write_str(s)
    }
}

enum Mapping {
    Bands(&'static [(f64, f64, &'static str)]),
    Labels(&'static [(&'static str, &'static str)]),
}

struct TraitText {
    section: Section,
    mapping: Mapping,
}

static MANIFOLD: Lazy<HashMap<&'static str, TraitText>> = Lazy::new(|| {
    HashMap::from([
        (
            "explanation_depth",
            TraitText {
                section: Section::Mission,
                mapping: Mapping::Bands(&[
                    (0.0, 0.3, "Explain using simple analogies. Avoid technical jargon."),
                    (0.3, 0.7, "Balance abstract theory with practical examples. Be professional and clear."),
                    (0.7, 1.0, "Dive deep into technical details using precise terminology."),
                ]),
            },
        ),
        (
            "humor_density",
            TraitText {
                section: Section::Style,
                mapping: Mapping::Bands(&[
                    (0.0, 0.2, "Maintain a serious, professional tone. No jokes."),
                    (0.2, 0.5, "Be pleasant and occasionally lighthearted."),
                    (0.5, 1.0, "Adopt an informal and humorous tone."),
                ]),
            },
        ),
        (
            "conflict_strategy",
            TraitText {
                section: Section::Policies,
                mapping: Mapping::Labels(&[
                    ("accommodating", "Prioritize agreement. Be polite even when challenging."),
                    ("assertive", "Confidently stand your ground."),
                    ("analytical", "Deconstruct conflicts using logic and evidence."),
                ]),
            },
        ),
        (
            "logical_rigor",
            TraitText {
                section: Section::OutputFormat,
                mapping: Mapping::Bands(&[
                    (0.0, 0.5, "Focus on intuition over detailed proofs."),
                    (0.5, 1.0, "Show your work concisely when necessary for correctness."),
                ]),
            },
        ),
        (
            "topic_attractors",
            TraitText {
                section: Section::OptionalFlavor,
                mapping: Mapping::Labels(&[
                    ("space_exploration", "Uses metaphors related to the cosmos."),
                    ("cybernetics", "Views problems through systems theory lenses."),
                    ("vintage_computing", "References legacy computing concepts."),
                ]),
            },
        ),
        (
            "identity_signature",
            TraitText {
                section: Section::Style,
                mapping: Mapping::Bands(&[
                    (0.0, 0.4, "Direct and concise."),
                    (0.4, 0.6, "Balanced and objective."),
                    (0.6, 1.0, "Collaborative and warm."),
                ]),
            },
        ),
    ])
});

fn base_text(mapping: &Mapping, value: &TraitValue) -> Option<&'static str> {
    match (mapping, value) {
        (Mapping::Bands(bands), TraitValue::Scalar(v)) => bands
            .iter()
            .find(|(low, high, _)| *low <= *v && *v <= *high)
            .map(|(_, _, text)| *text),
        (Mapping::Labels(labels), TraitValue::Label(label)) => labels
            .iter()
            .find(|(name, _)| *name == label.as_str())
            .map(|(_, text)| *text),
        _ => None,
    }
}

/// Render a projection into sectioned instructions.
///
/// `influence` gates the optional flavor section; `intimacy` gates
/// high-disclosure content regardless of the sampled value.
pub fn augment(projection: &Projection, influence: f64, intimacy: f64) -> String {
    let mut sections: HashMap<Section, Vec<String>> = HashMap::new();
    sections.insert(Section::Role, vec![ROLE_TEXT.to_string()]);

    for (trait_id, value) in projection {
        let Some(entry) = MANIFOLD.get(trait_id.as_str()) else {
            continue;
        };
        if entry.section == Section::OptionalFlavor && influence < FLAVOR_MIN_INFLUENCE {
            continue;
        }
        let Some(text) = base_text(&entry.mapping, value) else {
            continue;
        };

        let text = match (trait_id.as_str(), value) {
            ("explanation_depth", _)
                if text.contains("Explain using simple") && intimacy < ANALOGY_MIN_INTIMACY =>
            {
                NEUTRAL_TONE.to_string()
            }
            ("topic_attractors", TraitValue::Label(label)) if intimacy < ATTRACTOR_MIN_INTIMACY => {
                format!(
                    "Occasionally mention interests related to {}.",
                    label.replace('_', " ")
                )
            }
            _ => text.to_string(),
        };
        sections.entry(entry.section).or_default().push(format!("- {text}"));
    }

    Section::ORDER
        .iter()
        .filter_map(|section| {
            let lines = sections.get(section).filter(|l| !l.is_empty())?;
            Some(format!("[{}]\n{}", section, lines.join("\n")))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
