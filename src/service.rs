//! Persona service: kernel bootstrap and the public call surface.
//!
//! A [`PersonaService`] owns one event bus, one module registry and one
//! persona runtime. Concurrent sessions should use independent services.
//!
//! ```rust,no_run
//! use persona_kernel::service::PersonaService;
//! use persona_kernel::utilities::KernelConfig;
//!
//! let service = PersonaService::new(KernelConfig::default())?;
//! let ctx = service.run_cycle("Calculate 512 * 1024 / 4", "user_123", None)?;
//! let prompt = ctx.artifact.as_ref().and_then(|a| a.system_prompt());
//! # Ok::<(), persona_kernel::error::KernelError>(())
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::events::{Event, EventBus, EventHandler, EventType, HandlerId};
use crate::memory::{retrieval_filters, RetrievalFilters};
use crate::modules::{KernelModule, ModuleInfo, ModuleRegistry, ModuleType, StopReport};
use crate::persona::genome::FEEDBACK_MULTIPLIER;
use crate::persona::{FsmStatus, Genome, PersonaSnapshot, Stance};
use crate::pipeline::{CognitiveDirector, PersonaRuntime, PipelineContext};
use crate::utilities::KernelConfig;

/// Registry name of the persona state module.
pub const PERSONA_CORE_MODULE: &str = "persona_core";

const SOURCE: &str = "PersonaService";
const SNAPSHOT_PREFIX: &str = "snapshot_";

/// Registry handle onto the shared runtime, so kernel snapshots capture
/// the live persona state.
struct PersonaCoreModule {
    runtime: Arc<Mutex<PersonaRuntime>>,
}

impl KernelModule for PersonaCoreModule {
    fn capture_state(&self) -> Value {
        let rt = self.runtime.lock();
        json!({
            "fsm_state": rt.fsm.to_snapshot(),
            "genome": *rt.genome,
            "stance": rt.stance,
            "short_term_memory": rt.memory.len(),
            "kill_switch": rt.kill_switch,
        })
    }
}

/// States of every registered module at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSnapshot {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub module_states: Map<String, Value>,
}

pub struct PersonaService {
    config: KernelConfig,
    runtime: Arc<Mutex<PersonaRuntime>>,
    director: CognitiveDirector,
    registry: ModuleRegistry,
    bus: EventBus,
    shut_down: bool,
}

impl std::fmt::Debug for PersonaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaService")
            .field("persona_id", &self.config.persona_id)
            .field("director", &self.director)
            .field("modules", &self.registry.len())
            .field("bus", &self.bus)
            .finish()
    }
}

impl PersonaService {
    /// Bootstrap a service with the standard genome.
    pub fn new(config: KernelConfig) -> Result<Self> {
        let genome = Genome::standard(config.persona_id.clone());
        Self::with_genome(config, genome)
    }

    pub fn with_genome(config: KernelConfig, genome: Genome) -> Result<Self> {
        config.validate()?;
        genome.validate()?;

        let runtime = Arc::new(Mutex::new(PersonaRuntime::with_genome(&config, genome)?));
        let director = CognitiveDirector::new();

        let mut registry = ModuleRegistry::new();
        let core = ModuleInfo::new(
            PERSONA_CORE_MODULE,
            ModuleType::Structure,
            Arc::new(PersonaCoreModule {
                runtime: Arc::clone(&runtime),
            }),
        )
        .with_priority(100)
        .with_description("Persona FSM, genome and memory");
        registry.register(core);
        registry.enable(PERSONA_CORE_MODULE);
        director.register_modules(&mut registry);

        let bus = EventBus::new(config.bus.clone());
        bus.start()?;
        bus.publish(
            Event::new(EventType::SystemStart, SOURCE)
                .with_data("persona_id", config.persona_id.clone())
                .with_data("modules", registry.len()),
        );
        log::info!(
            "[PersonaService] Kernel initialized for '{}' ({} modules)",
            config.persona_id,
            registry.len()
        );

        Ok(Self {
            config,
            runtime,
            director,
            registry,
            bus,
            shut_down: false,
        })
    }

    /// Run one cognitive cycle.
    pub fn run_cycle(
        &self,
        user_input: &str,
        session_id: &str,
        manual_seed: Option<u64>,
    ) -> Result<PipelineContext> {
        let mut rt = self.runtime.lock();
        let ctx = self.director.run_cycle(
            user_input,
            session_id,
            manual_seed,
            &mut rt,
            Some(&self.bus),
            Some(&self.registry),
        )?;
        Ok(ctx)
    }

    /// Feed a persona output back for drift analysis.
    pub fn record_output(&self, text: &str) {
        self.runtime.lock().drift.record_output(text);
    }

    pub fn set_stance(&self, stance: Stance) {
        self.runtime.lock().set_stance(stance);
    }

    pub fn stance(&self) -> Stance {
        self.runtime.lock().stance
    }

    pub fn set_intimacy_level(&self, level: f64) {
        self.runtime.lock().fsm.set_intimacy_level(level);
    }

    /// Lock the persona, or unlock it back to STABLE.
    pub fn set_locked(&self, locked: bool) -> bool {
        self.runtime.lock().fsm.set_locked(locked)
    }

    /// Engage or release the kill switch. While engaged, every cycle
    /// returns plain assistant output at zero influence.
    pub fn set_kill_switch(&self, engaged: bool) {
        self.runtime.lock().set_kill_switch(engaged);
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.runtime.lock().kill_switch
    }

    /// Nudge range loci defaults from user feedback (locus id to delta).
    pub fn apply_feedback(&self, feedback: &BTreeMap<String, f64>) {
        let mut rt = self.runtime.lock();
        let next = rt.genome.with_feedback(feedback, FEEDBACK_MULTIPLIER);
        rt.replace_genome(next);
    }

    pub fn status(&self) -> FsmStatus {
        self.runtime.lock().fsm.status()
    }

    pub fn genome(&self) -> Arc<Genome> {
        Arc::clone(&self.runtime.lock().genome)
    }

    /// Retrieval hints derived from the current mood.
    pub fn memory_filters(&self) -> RetrievalFilters {
        retrieval_filters(self.runtime.lock().fsm.affect().current())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the FSM and genome to `dir/snapshot_<label>_<millis>.json`.
    pub fn save_state(&self, dir: &Path, label: &str) -> Result<PathBuf> {
        let snapshot = {
            let rt = self.runtime.lock();
            PersonaSnapshot::new(label, rt.fsm.to_snapshot(), (*rt.genome).clone())
        };
        let path = dir.join(format!(
            "{SNAPSHOT_PREFIX}{label}_{}.json",
            snapshot.timestamp.timestamp_millis()
        ));
        snapshot.save(&path)?;
        Ok(path)
    }

    /// Restore the FSM and genome from a snapshot file.
    pub fn load_state(&self, path: &Path) -> Result<()> {
        let snapshot = PersonaSnapshot::load(path)?;
        let mut rt = self.runtime.lock();
        rt.fsm.restore(&snapshot.fsm_state);
        rt.replace_genome(snapshot.genome);
        Ok(())
    }

    /// Restore the newest snapshot in `dir`. Returns its path, or `None`
    /// when the directory holds no snapshots.
    pub fn load_latest_state(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let latest = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter_map(|path| snapshot_millis(&path).map(|ms| (ms, path)))
                .max_by_key(|(ms, _)| *ms)
                .map(|(_, path)| path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        match latest {
            Some(path) => {
                self.load_state(&path)?;
                Ok(Some(path))
            }
            None => {
                log::info!("[PersonaService] No snapshots found in {}", dir.display());
                Ok(None)
            }
        }
    }

    /// Capture every module's state and publish `SnapshotCreated`.
    pub fn take_snapshot(&self, label: &str) -> KernelSnapshot {
        let snapshot = KernelSnapshot {
            label: label.to_string(),
            timestamp: Utc::now(),
            module_states: self.registry.capture_states(),
        };
        self.bus.publish(
            Event::new(EventType::SnapshotCreated, SOURCE)
                .with_data("label", label)
                .with_data("module_states", Value::Object(snapshot.module_states.clone())),
        );
        log::info!(
            "[PersonaService] Snapshot '{}' captured ({} modules)",
            label,
            snapshot.module_states.len()
        );
        snapshot
    }

    // -----------------------------------------------------------------------
    // Kernel access
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.bus.subscribe(event_type, handler)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Stop every module and the bus. Idempotent.
    pub fn shutdown(&mut self) -> StopReport {
        if self.shut_down {
            return StopReport::default();
        }
        self.shut_down = true;

        let report = self.registry.stop_all();
        self.bus.publish(
            Event::new(EventType::SystemStop, SOURCE)
                .with_data("stopped", report.stopped)
                .with_data("failed", report.failed),
        );
        self.bus
            .flush(Duration::from_millis(self.config.bus.shutdown_timeout_ms));
        self.bus.stop();
        log::info!(
            "[PersonaService] Shutdown complete ({} modules stopped, {} failed)",
            report.stopped,
            report.failed
        );
        report
    }
}

impl Drop for PersonaService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Millisecond stamp of a `snapshot_<label>_<millis>.json` file name.
fn snapshot_millis(path: &Path) -> Option<i64> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if !stem.starts_with(SNAPSHOT_PREFIX) {
        return None;
    }
    stem.rsplit('_').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::check_leakage;
    use crate::events::FnHandler;
    use crate::memory::MoodBias;
    use crate::modules::ModuleStatus;
    use crate::persona::PersonaState;
    use crate::pipeline::{Mode, Scene, KILL_SWITCH_REASON, PLAIN_ASSISTANT_PROMPT};

    fn service() -> PersonaService {
        PersonaService::new(KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_factual_scenario() {
        let service = service();
        let ctx = service.run_cycle("Calculate 512 * 1024 / 4", "user_1", None).unwrap();
        assert_eq!(ctx.scene, Some(Scene::StrictFact));
        assert_eq!(ctx.constraints.influence, 0.1);
        assert_eq!(ctx.constraints.mode, Mode::StyleOnly);
        assert_eq!(service.stance(), Stance::new(0.9, 0.2, 0.1));

        let prompt = ctx.artifact.as_ref().unwrap().system_prompt().unwrap();
        assert!(!check_leakage(Scene::StrictFact, prompt).leakage_detected);
    }

    #[test]
    fn test_support_scenario() {
        let service = service();
        let ctx = service
            .run_cycle("I need some help feeling better", "user_1", None)
            .unwrap();
        assert_eq!(ctx.scene, Some(Scene::SocialSupport));
        assert_eq!(ctx.constraints.recommended_stance.unwrap().warmth, 0.9);
        // The supportive baseline (p = 0.52) lifts the mood.
        assert_eq!(service.memory_filters().mood_bias, MoodBias::Positive);
    }

    #[test]
    fn test_registry_bootstrap() {
        let service = service();
        let registry = service.registry();
        assert_eq!(registry.len(), 6);
        assert_eq!(
            registry.get_info(PERSONA_CORE_MODULE).unwrap().status,
            ModuleStatus::Running
        );
        let enabled = registry.get_enabled_modules(true);
        assert_eq!(enabled[0].name, PERSONA_CORE_MODULE);
        assert_eq!(enabled[1].name, "L0_ScenarioAnalysis");
    }

    #[test]
    fn test_take_snapshot_captures_persona_state() {
        let service = service();
        service.run_cycle("hello", "s", None).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.subscribe(
            EventType::SnapshotCreated,
            Arc::new(FnHandler::new("sink", move |e: &Event| {
                sink.lock().push(e.id().to_string());
                Ok(())
            })),
        );

        let snapshot = service.take_snapshot("manual");
        let core = &snapshot.module_states[PERSONA_CORE_MODULE];
        assert_eq!(core["fsm_state"]["interaction_count"], 1);
        assert!(core["genome"]["loci"].is_array());
        assert!(service.bus().flush(Duration::from_secs(5)));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_save_and_load_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let service = service();
        for _ in 0..12 {
            service.run_cycle("hello", "s", None).unwrap();
        }
        service.save_state(dir.path(), "first").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        service.run_cycle("hello", "s", None).unwrap();
        let latest = service.save_state(dir.path(), "second").unwrap();

        let fresh = PersonaService::new(KernelConfig::default()).unwrap();
        assert_eq!(fresh.load_latest_state(dir.path()).unwrap(), Some(latest));
        let status = fresh.status();
        assert_eq!(status.interaction_count, 13);
        assert_eq!(status.state, PersonaState::Stabilizing);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(fresh.load_latest_state(empty.path()).unwrap(), None);
    }

    #[test]
    fn test_drift_feedback_loop() {
        let service = service();
        service.set_stance(Stance::new(0.9, 0.2, 0.1));
        service.record_output("Sure thing, happy to help friend! Love it, thanks!");
        let ctx = service.run_cycle("tell me about rockets", "s", None).unwrap();
        assert!(ctx.has_reason("DRIFT_DETECTED_CORRECTION_APPLIED"));
        let prompt = ctx.artifact.unwrap().messages[0].content.clone();
        assert!(prompt.contains("[GOVERNANCE OVERRIDE]"));
    }

    #[test]
    fn test_kill_switch_forces_plain_output() {
        let service = service();
        service.set_kill_switch(true);
        assert!(service.kill_switch_engaged());

        let ctx = service.run_cycle("Be playful, tell me a joke", "s", None).unwrap();
        let artifact = ctx.artifact.as_ref().unwrap();
        assert_eq!(artifact.metadata.reason_codes, vec![KILL_SWITCH_REASON]);
        assert_eq!(ctx.constraints.influence, 0.0);
        assert_eq!(artifact.system_prompt(), Some(PLAIN_ASSISTANT_PROMPT));
        assert_eq!(service.status().interaction_count, 0);
        assert_eq!(
            service.take_snapshot("killed").module_states[PERSONA_CORE_MODULE]["kill_switch"],
            true
        );

        service.set_kill_switch(false);
        let ctx = service.run_cycle("Be playful, tell me a joke", "s", None).unwrap();
        assert!(!ctx.has_reason(KILL_SWITCH_REASON));
        assert_eq!(service.status().interaction_count, 1);
    }

    #[test]
    fn test_feedback_replaces_genome() {
        let service = service();
        let before = service.genome();
        service.apply_feedback(&BTreeMap::from([("humor_density".to_string(), 1.0)]));
        let after = service.genome();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(
            after.locus("humor_density").unwrap().range_default()
                > before.locus("humor_density").unwrap().range_default()
        );
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut service = service();
        service.run_cycle("hello", "s", None).unwrap();
        let report = service.shutdown();
        assert_eq!(report.stopped, 6);
        assert_eq!(report.failed, 0);
        assert!(!service.bus().is_running());
        assert_eq!(service.shutdown(), StopReport::default());

        let log = service.bus().event_log().unwrap().get_all();
        assert_eq!(log.first().unwrap().event_type(), EventType::SystemStart);
        assert_eq!(log.last().unwrap().event_type(), EventType::SystemStop);
    }
}
