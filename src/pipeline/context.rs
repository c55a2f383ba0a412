//! Request-scoped execution and audit container for one cognitive cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scenario::{Mode, Scene};
use crate::persona::{Pad, PersonaState, Stance};
use crate::utilities::trace::new_trace_id;

/// Constraints accumulated by the steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub influence: f64,
    pub mode: Mode,
    pub recommended_stance: Option<Stance>,
    /// Drift correction directives appended to the system prompt.
    pub governance_override: Option<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            influence: 1.0,
            mode: Mode::FullPersona,
            recommended_stance: None,
            governance_override: None,
        }
    }
}

/// Persona state as seen by this cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaView {
    pub state: Option<PersonaState>,
    pub affect: Option<Pad>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trace_id: String,
    pub session_id: String,
    pub contract_version: String,
    pub stance: Stance,
    pub affect: Option<Pad>,
    pub reason_codes: Vec<String>,
    pub mode: Mode,
}

/// Final output of a cycle: a chat payload ready for an LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub model: String,
    pub messages: Vec<Message>,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    pub trace_id: String,
    pub session_id: String,
    pub user_input: String,
    pub manual_seed: Option<u64>,

    pub scene: Option<Scene>,
    pub constraints: Constraints,
    pub persona_snapshot: PersonaView,

    pub artifact: Option<Artifact>,
    /// Append-only audit trail.
    pub reason_codes: Vec<String>,
    /// Ids of events emitted during the cycle, in order.
    pub event_refs: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl PipelineContext {
    pub fn new(
        user_input: impl Into<String>,
        session_id: impl Into<String>,
        manual_seed: Option<u64>,
    ) -> Self {
        Self {
            trace_id: new_trace_id(),
            session_id: session_id.into(),
            user_input: user_input.into(),
            manual_seed,
            scene: None,
            constraints: Constraints::default(),
            persona_snapshot: PersonaView::default(),
            artifact: None,
            reason_codes: Vec::new(),
            event_refs: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn push_reason(&mut self, code: impl Into<String>) {
        self.reason_codes.push(code.into());
    }

    pub fn has_reason(&self, code: &str) -> bool {
        self.reason_codes.iter().any(|c| c == code)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context() {
        let ctx = PipelineContext::new("hi", "s1", Some(7));
        assert!(ctx.trace_id.starts_with("TR-"));
        assert_eq!(ctx.session_id, "s1");
        assert_eq!(ctx.manual_seed, Some(7));
        assert!(ctx.scene.is_none());
        assert!(ctx.artifact.is_none());
        assert!(ctx.reason_codes.is_empty());
    }

    #[test]
    fn test_artifact_wire_shape() {
        let artifact = Artifact {
            model: "persona_v1".into(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: "sys".into(),
                },
                Message {
                    role: Role::User,
                    content: "hi".into(),
                },
            ],
            metadata: ArtifactMetadata {
                trace_id: "TR-1".into(),
                session_id: "s".into(),
                contract_version: "1.0.0".into(),
                stance: Stance::NEUTRAL,
                affect: None,
                reason_codes: vec!["SCENE_SOCIAL_CREATIVE".into()],
                mode: Mode::FullPersona,
            },
        };
        assert_eq!(artifact.system_prompt(), Some("sys"));
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["metadata"]["mode"], "FULL_PERSONA");
        assert_eq!(value["metadata"]["stance"]["rigor"], 0.5);
    }
}
