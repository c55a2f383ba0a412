//! Scenario analysis: classify raw input into a scene.
//!
//! Keyword lists are matched as lowercase substrings. Fact keywords are
//! checked before support keywords and the first hit wins; anything else is
//! a creative scene.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::persona::Stance;

const FACT_KEYWORDS: &[&str] = &[
    "calculate",
    "compute",
    "prove",
    "math",
    "fact",
    "tutorial",
    "square root",
    "formula",
    "definition",
    "scientific",
    "technical",
    "review",
    "expert",
    "logic",
    "sqrt",
    "计算",
    "证明",
    "平方根",
    "solve",
    "analyze",
];

const SUPPORT_KEYWORDS: &[&str] = &[
    "help",
    "feel",
    "sad",
    "lonely",
    "comfort",
    "support",
    "need someone",
    "listen",
    "tough day",
    "thank you",
    "thanks",
    "love",
    "friend",
    "companion",
];

/// Influence applied to STRICT_FACT scenes.
pub const FACTUAL_INFLUENCE: f64 = 0.1;

/// High rigor, low warmth, low chaos.
pub const FACTUAL_STANCE: Stance = Stance::new(0.9, 0.2, 0.1);

/// Low rigor, high warmth, moderate chaos.
pub const SUPPORTIVE_STANCE: Stance = Stance::new(0.3, 0.9, 0.4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scene {
    StrictFact,
    SocialSupport,
    SocialCreative,
}

impl Scene {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scene::StrictFact => "STRICT_FACT",
            Scene::SocialSupport => "SOCIAL_SUPPORT",
            Scene::SocialCreative => "SOCIAL_CREATIVE",
        }
    }

    /// Constraints implied by this scene.
    pub fn profile(&self, base_influence: f64) -> SceneProfile {
        match self {
            Scene::StrictFact => SceneProfile {
                influence: FACTUAL_INFLUENCE,
                mode: Mode::StyleOnly,
                recommended_stance: Some(FACTUAL_STANCE),
                reason_code: "INFLUENCE_DEGRADED_FACTUAL",
            },
            Scene::SocialSupport => SceneProfile {
                influence: base_influence,
                mode: Mode::FullPersona,
                recommended_stance: Some(SUPPORTIVE_STANCE),
                reason_code: "INFLUENCE_FULL_SUPPORT",
            },
            Scene::SocialCreative => SceneProfile {
                influence: base_influence,
                mode: Mode::FullPersona,
                recommended_stance: None,
                reason_code: "INFLUENCE_FULL_CREATIVE",
            },
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the persona reaches the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    StyleOnly,
    #[default]
    FullPersona,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::StyleOnly => "STYLE_ONLY",
            Mode::FullPersona => "FULL_PERSONA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneProfile {
    pub influence: f64,
    pub mode: Mode,
    pub recommended_stance: Option<Stance>,
    pub reason_code: &'static str,
}

pub fn analyze_scenario(user_input: &str) -> Scene {
    let text = user_input.to_lowercase();
    if FACT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Scene::StrictFact
    } else if SUPPORT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Scene::SocialSupport
    } else {
        Scene::SocialCreative
    }
}
