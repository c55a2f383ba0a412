//! Cognitive pipeline.
//!
//! One call to [`CognitiveDirector::run_cycle`] threads a fresh
//! [`PipelineContext`] through the ordered steps:
//!
//! ```text
//! L0_ScenarioAnalysis -> L1_FSMEvaluation -> L2_Validation
//!     -> L3_Projection -> L4_MemoryRefinement
//! ```
//!
//! Steps mutate the context and the [`PersonaRuntime`] in place. When a bus
//! is supplied each step publishes events tagged with the cycle's trace id.

pub mod context;
pub mod director;
pub mod runtime;
pub mod scenario;
pub mod steps;

// Re-exports
pub use context::{Artifact, ArtifactMetadata, Constraints, Message, PersonaView, PipelineContext, Role};
pub use director::{CognitiveDirector, PipelineError, KILL_SWITCH_REASON};
pub use runtime::PersonaRuntime;
pub use scenario::{analyze_scenario, Mode, Scene, SceneProfile};
pub use steps::{
    standard_steps, FsmEvaluationStep, MemoryRefinementStep, PipelineStep, ProjectionStep,
    ScenarioAnalysisStep, StepError, ValidationStep, PLAIN_ASSISTANT_PROMPT,
};
