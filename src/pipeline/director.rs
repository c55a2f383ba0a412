//! Cognitive director: runs the ordered steps for one cycle.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use super::context::PipelineContext;
use super::runtime::PersonaRuntime;
use super::scenario::Mode;
use super::steps::{build_artifact, notify, standard_steps, PipelineStep, PLAIN_ASSISTANT_PROMPT};
use crate::events::{Event, EventBus, EventType};
use crate::modules::{KernelModule, ModuleInfo, ModuleRegistry, ModuleStatus};
use crate::persona::Stance;

/// Reason code recorded for cycles run with the kill switch engaged.
pub const KILL_SWITCH_REASON: &str = "KILL_SWITCH_ENGAGED";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cycle {trace_id} produced no artifact (reason codes: {reason_codes:?})")]
    NoArtifact {
        trace_id: String,
        reason_codes: Vec<String>,
    },
}

/// A step together with the handle it is registered under.
struct StepEntry {
    step: Arc<dyn PipelineStep>,
    module: Arc<dyn KernelModule>,
}

pub struct CognitiveDirector {
    steps: Vec<StepEntry>,
}

impl Default for CognitiveDirector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CognitiveDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitiveDirector")
            .field("steps", &self.step_names())
            .finish()
    }
}

/// Stateless module handle for a step.
struct StepModule;

impl KernelModule for StepModule {}

impl CognitiveDirector {
    /// Director with the five standard steps.
    pub fn new() -> Self {
        Self::with_steps(standard_steps())
    }

    pub fn with_steps(steps: Vec<Arc<dyn PipelineStep>>) -> Self {
        let steps = steps
            .into_iter()
            .map(|step| StepEntry {
                step,
                module: Arc::new(StepModule),
            })
            .collect();
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|e| e.step.name()).collect()
    }

    /// Register every step with `registry`, earlier steps at higher
    /// priority. Returns how many were newly registered.
    pub fn register_modules(&self, registry: &mut ModuleRegistry) -> usize {
        let total = self.steps.len() as i32;
        let mut registered = 0;
        for (i, entry) in self.steps.iter().enumerate() {
            let name = entry.step.name();
            let info = ModuleInfo::new(name, entry.step.module_type(), Arc::clone(&entry.module))
                .with_priority((total - i as i32) * 10)
                .with_description(entry.step.description());
            if registry.register(info) {
                registry.enable(name);
                registered += 1;
            }
        }
        registered
    }

    /// Run one cycle.
    ///
    /// A failing step is recorded as `STEP_FAILED_<name>` and the remaining
    /// steps still run. Steps disabled in `registry` are skipped. The cycle
    /// fails only if no artifact was produced.
    pub fn run_cycle(
        &self,
        user_input: &str,
        session_id: &str,
        manual_seed: Option<u64>,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
        registry: Option<&ModuleRegistry>,
    ) -> Result<PipelineContext, PipelineError> {
        let mut ctx = PipelineContext::new(user_input, session_id, manual_seed);
        log::info!(
            "[CognitiveDirector] Cycle {} started (session={})",
            ctx.trace_id,
            ctx.session_id
        );

        if let Some(bus) = bus {
            let event = Event::new(EventType::PersonaInput, "CognitiveDirector")
                .with_data("text", user_input)
                .with_data("session_id", session_id)
                .with_metadata("trace_id", ctx.trace_id.clone());
            ctx.event_refs.push(event.id().to_string());
            bus.publish(event);
        }

        if rt.kill_switch {
            Self::bypass_persona(&mut ctx, bus);
        } else {
            self.run_steps(&mut ctx, rt, bus, registry);
        }

        // The artifact's audit trail covers the whole cycle, including
        // codes added after projection.
        let reason_codes = ctx.reason_codes.clone();
        match ctx.artifact.as_mut() {
            Some(artifact) => artifact.metadata.reason_codes = reason_codes,
            None => {
                log::error!("[CognitiveDirector] Cycle {} produced no artifact", ctx.trace_id);
                return Err(PipelineError::NoArtifact {
                    trace_id: ctx.trace_id,
                    reason_codes,
                });
            }
        }

        log::info!(
            "[CognitiveDirector] Cycle {} finished in {}ms ({} events)",
            ctx.trace_id,
            ctx.elapsed_ms(),
            ctx.event_refs.len()
        );
        log::debug!("[CognitiveDirector] Reason codes {}", json!(ctx.reason_codes));
        Ok(ctx)
    }

    /// Plain assistant output at zero influence. No step runs and the
    /// persona state is left untouched.
    fn bypass_persona(ctx: &mut PipelineContext, bus: Option<&EventBus>) {
        log::warn!(
            "[CognitiveDirector] Kill switch engaged, persona bypassed in cycle {}",
            ctx.trace_id
        );
        ctx.constraints.influence = 0.0;
        ctx.constraints.mode = Mode::StyleOnly;
        ctx.push_reason(KILL_SWITCH_REASON);

        let artifact = build_artifact(ctx, PLAIN_ASSISTANT_PROMPT.to_string(), Stance::NEUTRAL);
        let metadata = json!(artifact.metadata);
        ctx.artifact = Some(artifact);

        notify(
            "CognitiveDirector",
            bus,
            EventType::PersonaDegraded,
            vec![
                ("reason", json!(KILL_SWITCH_REASON)),
                ("target_influence", json!(0.0)),
            ],
            ctx,
        );
        notify("CognitiveDirector", bus, EventType::ArtifactReady, vec![("metadata", metadata)], ctx);
    }

    fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut PersonaRuntime,
        bus: Option<&EventBus>,
        registry: Option<&ModuleRegistry>,
    ) {
        for entry in &self.steps {
            let name = entry.step.name();
            let disabled = registry
                .and_then(|r| r.get_info(name))
                .is_some_and(|info| info.status == ModuleStatus::Disabled);
            if disabled {
                log::debug!("[CognitiveDirector] Step {} is disabled, skipping", name);
                ctx.push_reason(format!("STEP_SKIPPED_{name}"));
                continue;
            }

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry.step.execute(ctx, rt, bus)
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!(
                        "[CognitiveDirector] Step {} failed in cycle {}: {}",
                        name,
                        ctx.trace_id,
                        e
                    );
                    ctx.push_reason(format!("STEP_FAILED_{name}"));
                }
                Err(panic) => {
                    log::error!(
                        "[CognitiveDirector] Step {} panicked in cycle {}: {:?}",
                        name,
                        ctx.trace_id,
                        panic
                    );
                    ctx.push_reason(format!("STEP_FAILED_{name}"));
                }
            }
        }
    }
}
