//! The five cognitive pipeline steps.
//!
//! Each step mutates the [`PipelineContext`] in place, appends reason codes,
//! and (when a bus is present) publishes events correlated by `trace_id`.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::context::{Artifact, ArtifactMetadata, Message, PersonaView, PipelineContext, Role};
use super::runtime::PersonaRuntime;
use super::scenario::{analyze_scenario, Scene};
use crate::events::{Event, EventBus, EventType};
use crate::memory::{JournalError, MemoryEntry};
use crate::modules::ModuleType;
use crate::persona::{augment, Projection, SamplingError, Stance};
use crate::utilities::CONTRACT_VERSION;

/// Model name stamped into artifacts.
pub const ARTIFACT_MODEL: &str = "persona_v1";

/// System prompt used while the persona is bypassed.
pub const PLAIN_ASSISTANT_PROMPT: &str =
    "You are a helpful assistant. Answer plainly and accurately, without persona styling.";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("sampling failed: {0}")]
    Sampling(#[from] SamplingError),

    #[error("journal write failed: {0}")]
    Journal(#[from] JournalError),
}

/// One stage of a cognitive cycle.
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Module category used when the step is registered with the kernel.
    fn module_type(&self) -> ModuleType;

    fn description(&self) -> &'static str {
        ""
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError>;
}

/// Publish a correlated event and record its id on the context.
pub(super) fn notify(
    source: &str,
    bus: Option<&EventBus>,
    event_type: EventType,
    data: Vec<(&str, Value)>,
    ctx: &mut PipelineContext,
) {
    let Some(bus) = bus else {
        return;
    };
    let mut event = Event::new(event_type, source).with_metadata("trace_id", ctx.trace_id.clone());
    for (key, value) in data {
        event = event.with_data(key, value);
    }
    ctx.event_refs.push(event.id().to_string());
    bus.publish(event);
}

// ---------------------------------------------------------------------------
// L0: scenario analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScenarioAnalysisStep;

impl PipelineStep for ScenarioAnalysisStep {
    fn name(&self) -> &'static str {
        "L0_ScenarioAnalysis"
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Interpretation
    }

    fn description(&self) -> &'static str {
        "Classify input and derive influence, mode and stance"
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError> {
        let scene = analyze_scenario(&ctx.user_input);
        let profile = scene.profile(rt.base_influence);

        ctx.scene = Some(scene);
        ctx.constraints.influence = profile.influence;
        ctx.constraints.mode = profile.mode;
        ctx.constraints.recommended_stance = profile.recommended_stance;
        ctx.push_reason(format!("SCENE_{scene}"));
        ctx.push_reason(profile.reason_code);

        notify(
            self.name(),
            bus,
            EventType::SceneAnalyzed,
            vec![
                ("scene", json!(scene)),
                ("mode", json!(profile.mode)),
                ("influence", json!(profile.influence)),
            ],
            ctx,
        );
        if scene == Scene::StrictFact {
            notify(
                self.name(),
                bus,
                EventType::PersonaDegraded,
                vec![
                    ("reason", json!("STRICT_FACT_MODE")),
                    ("target_influence", json!(profile.influence)),
                ],
                ctx,
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// L1: FSM evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FsmEvaluationStep;

impl PipelineStep for FsmEvaluationStep {
    fn name(&self) -> &'static str {
        "L1_FSMEvaluation"
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Structure
    }

    fn description(&self) -> &'static str {
        "Pulse and decay affect, advance the persona lifecycle"
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError> {
        match ctx.scene {
            Some(Scene::SocialSupport) => rt.fsm.affect_mut().update(0.2, 0.1, 0.0),
            Some(Scene::SocialCreative) => rt.fsm.affect_mut().update(0.05, 0.02, 0.0),
            Some(Scene::StrictFact) | None => {}
        }

        let multiplier = if rt.fsm.is_locked() {
            rt.locked_decay_multiplier
        } else {
            1.0
        };
        rt.fsm.affect_mut().decay_scaled(multiplier);
        rt.fsm.record_interaction();

        let status = rt.fsm.status();
        ctx.persona_snapshot = PersonaView {
            state: Some(status.state),
            affect: Some(status.affect),
        };
        ctx.push_reason(format!("FSM_STATE_{}", status.state));

        notify(
            self.name(),
            bus,
            EventType::PersonaStateChanged,
            vec![
                ("state", json!(status.state)),
                ("affect", json!(status.affect)),
                ("interaction_count", json!(status.interaction_count)),
            ],
            ctx,
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// L2: drift validation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ValidationStep;

impl PipelineStep for ValidationStep {
    fn name(&self) -> &'static str {
        "L2_Validation"
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Validation
    }

    fn description(&self) -> &'static str {
        "Compare recent outputs with the target stance"
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError> {
        let correction = rt.check_drift().and_then(|report| report.correction);
        match &correction {
            Some(_) => ctx.push_reason("DRIFT_DETECTED_CORRECTION_APPLIED"),
            None => ctx.push_reason("GOVERNANCE_PASS"),
        }
        ctx.constraints.governance_override = correction.clone();

        let has_drift = correction.is_some();
        notify(
            self.name(),
            bus,
            EventType::DriftChecked,
            vec![("correction", json!(correction)), ("has_drift", json!(has_drift))],
            ctx,
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// L3: projection
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ProjectionStep;

impl ProjectionStep {
    fn render_prompt(instructions: &str, habits: &str, governance: Option<&str>) -> String {
        let mut prompt = format!(
            "You are operating under personality constraints:\n{instructions}\n\n\
             [BEHAVIORAL HABITS (PROVENANCE: GENERATED)]\n{habits}"
        );
        if let Some(directive) = governance {
            prompt.push_str(&format!("\n[GOVERNANCE OVERRIDE]\n{directive}\n"));
        }
        prompt
    }
}

impl PipelineStep for ProjectionStep {
    fn name(&self) -> &'static str {
        "L3_Projection"
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Rendering
    }

    fn description(&self) -> &'static str {
        "Sample traits and render the system prompt"
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError> {
        let recommended = ctx.constraints.recommended_stance;
        if let Some(stance) = recommended {
            rt.set_stance(stance);
            ctx.push_reason("STANCE_AUTO_ADJUSTED");
        }

        let influence = ctx.constraints.influence;
        let warp = rt.fsm.affect().get_warp_factors();
        let genome = Arc::clone(&rt.genome);
        let mut projection: Projection = Vec::with_capacity(genome.loci.len());
        for locus in &genome.loci {
            let value =
                rt.sampler
                    .sample_trait(locus, &ctx.session_id, influence, warp, ctx.manual_seed)?;
            projection.push((locus.id.clone(), value));
        }

        let instructions = augment(&projection, influence, rt.fsm.intimacy_level());
        ctx.push_reason("PROMPT_AUGMENTED");

        let habits = rt.habits.render(&ctx.session_id);
        let prompt = Self::render_prompt(
            &instructions,
            &habits,
            ctx.constraints.governance_override.as_deref(),
        );

        let artifact = build_artifact(ctx, prompt, recommended.unwrap_or(Stance::NEUTRAL));
        let metadata = json!(artifact.metadata);
        ctx.artifact = Some(artifact);

        let projection_map: Map<String, Value> = projection
            .iter()
            .map(|(id, value)| (id.clone(), json!(value)))
            .collect();
        notify(
            self.name(),
            bus,
            EventType::TraitsSampled,
            vec![("projection", Value::Object(projection_map))],
            ctx,
        );
        notify(
            self.name(),
            bus,
            EventType::ArtifactReady,
            vec![("metadata", metadata)],
            ctx,
        );
        Ok(())
    }
}

/// Chat artifact for `ctx` with the given system prompt.
pub(super) fn build_artifact(ctx: &PipelineContext, system_prompt: String, stance: Stance) -> Artifact {
    Artifact {
        model: ARTIFACT_MODEL.to_string(),
        messages: vec![
            Message {
                role: Role::System,
                content: system_prompt,
            },
            Message {
                role: Role::User,
                content: ctx.user_input.clone(),
            },
        ],
        metadata: ArtifactMetadata {
            trace_id: ctx.trace_id.clone(),
            session_id: ctx.session_id.clone(),
            contract_version: CONTRACT_VERSION.to_string(),
            stance,
            affect: ctx.persona_snapshot.affect,
            reason_codes: ctx.reason_codes.clone(),
            mode: ctx.constraints.mode,
        },
    }
}

// ---------------------------------------------------------------------------
// L4: memory refinement
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRefinementStep;

impl PipelineStep for MemoryRefinementStep {
    fn name(&self) -> &'static str {
        "L4_MemoryRefinement"
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Feature
    }

    fn description(&self) -> &'static str {
        "Record the interaction in short-term memory and the journal"
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
    ) -> Result<(), StepError> {
        let status = rt.fsm.status();
        let entry = MemoryEntry::new(
            status.state,
            status.affect,
            ctx.user_input.clone(),
            ctx.trace_id.clone(),
        );
        let prune_codes = rt.memory.add(entry);
        ctx.reason_codes.extend(prune_codes.iter().cloned());

        let journaled = rt
            .journal
            .as_ref()
            .map(|journal| journal.log_entry(&status, Some(&ctx.user_input)))
            .transpose();

        notify(
            self.name(),
            bus,
            EventType::MemoryRefined,
            vec![
                ("pruned", json!(!prune_codes.is_empty())),
                ("reason_codes", json!(prune_codes)),
            ],
            ctx,
        );
        journaled?;
        Ok(())
    }
}

/// The standard step order.
pub fn standard_steps() -> Vec<Arc<dyn PipelineStep>> {
    vec![
        Arc::new(ScenarioAnalysisStep),
        Arc::new(FsmEvaluationStep),
        Arc::new(ValidationStep),
        Arc::new(ProjectionStep),
        Arc::new(MemoryRefinementStep),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaState;
    use crate::utilities::KernelConfig;

    fn runtime() -> PersonaRuntime {
        PersonaRuntime::new(&KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_scenario_step_sets_constraints() {
        let mut rt = runtime();
        let mut ctx = PipelineContext::new("Calculate 512 * 1024 / 4", "s", None);
        ScenarioAnalysisStep.execute(&mut ctx, &mut rt, None).unwrap();
        assert_eq!(ctx.scene, Some(Scene::StrictFact));
        assert_eq!(ctx.constraints.influence, 0.1);
        assert_eq!(
            ctx.reason_codes,
            vec!["SCENE_STRICT_FACT", "INFLUENCE_DEGRADED_FACTUAL"]
        );
    }

    #[test]
    fn test_fsm_step_pulses_and_counts() {
        let mut rt = runtime();
        let mut ctx = PipelineContext::new("thanks friend", "s", None);
        ScenarioAnalysisStep.execute(&mut ctx, &mut rt, None).unwrap();
        FsmEvaluationStep.execute(&mut ctx, &mut rt, None).unwrap();

        assert_eq!(rt.fsm.interaction_count(), 1);
        // +0.2 then one decay step of 10% toward 0.
        let affect = ctx.persona_snapshot.affect.unwrap();
        assert!((affect.p - 0.18).abs() < 1e-9);
        assert!((affect.a - 0.09).abs() < 1e-9);
        assert_eq!(ctx.persona_snapshot.state, Some(PersonaState::Forming));
        assert!(ctx.has_reason("FSM_STATE_FORMING"));
    }

    #[test]
    fn test_validation_step_applies_correction() {
        let mut rt = runtime();
        rt.set_stance(Stance::new(0.9, 0.2, 0.1));
        rt.drift.record_output("sure thing");

        let mut ctx = PipelineContext::new("x", "s", None);
        ValidationStep.execute(&mut ctx, &mut rt, None).unwrap();
        assert!(ctx.has_reason("DRIFT_DETECTED_CORRECTION_APPLIED"));
        let directive = ctx.constraints.governance_override.unwrap();
        assert!(directive.starts_with("CRITICAL: Output lacks Rigor"));
    }

    #[test]
    fn test_validation_step_passes_without_history() {
        let mut rt = runtime();
        let mut ctx = PipelineContext::new("x", "s", None);
        ValidationStep.execute(&mut ctx, &mut rt, None).unwrap();
        assert_eq!(ctx.reason_codes, vec!["GOVERNANCE_PASS"]);
        assert!(ctx.constraints.governance_override.is_none());
    }

    #[test]
    fn test_projection_step_builds_artifact() {
        let mut rt = runtime();
        let mut ctx = PipelineContext::new("I need some help feeling better", "s", Some(42));
        ScenarioAnalysisStep.execute(&mut ctx, &mut rt, None).unwrap();
        ctx.constraints.governance_override = Some("NOTICE: test".into());
        ProjectionStep.execute(&mut ctx, &mut rt, None).unwrap();

        assert_eq!(rt.stance.warmth, 0.9);
        assert!(ctx.has_reason("STANCE_AUTO_ADJUSTED"));
        let artifact = ctx.artifact.as_ref().unwrap();
        assert_eq!(artifact.model, "persona_v1");
        assert_eq!(artifact.messages[1].content, "I need some help feeling better");
        let prompt = artifact.system_prompt().unwrap();
        assert!(prompt.starts_with("You are operating under personality constraints:\n"));
        assert!(prompt.contains("[BEHAVIORAL HABITS (PROVENANCE: GENERATED)]\n- "));
        assert!(prompt.ends_with("\n[GOVERNANCE OVERRIDE]\nNOTICE: test\n"));
        assert_eq!(artifact.metadata.stance.warmth, 0.9);
        assert_eq!(artifact.metadata.contract_version, "1.0.0");
    }

    #[test]
    fn test_memory_step_journals() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KernelConfig::default();
        config.memory.journal_path = Some(dir.path().join("journal.jsonl"));
        let mut rt = PersonaRuntime::new(&config).unwrap();

        let mut ctx = PipelineContext::new("hello", "s", None);
        MemoryRefinementStep.execute(&mut ctx, &mut rt, None).unwrap();
        assert_eq!(rt.memory.len(), 1);
        assert_eq!(rt.memory.entries()[0].trace_id, ctx.trace_id);
        let recent = rt.journal.as_ref().unwrap().recent(1).unwrap();
        assert_eq!(recent[0].context_shorthand, "hello");
    }
}
