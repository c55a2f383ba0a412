//! Mutable persona state the pipeline steps operate on.

use std::sync::Arc;

use crate::memory::{JournalError, ReflectionJournal, ShortTermMemory};
use crate::persona::{
    affect_baseline, AffectState, DeterministicSampler, DriftReport, Genome, HabitGenerator,
    PersonaFsm, Stance, StanceDriftController,
};
use crate::utilities::KernelConfig;

/// Everything one persona session owns.
///
/// The genome is shared copy-on-write: updates build a new [`Genome`] and
/// swap the `Arc`, so a projection that cloned the handle keeps a
/// consistent view.
#[derive(Debug)]
pub struct PersonaRuntime {
    pub fsm: PersonaFsm,
    pub genome: Arc<Genome>,
    /// Target stance for drift checks.
    pub stance: Stance,
    pub sampler: DeterministicSampler,
    pub drift: StanceDriftController,
    pub memory: ShortTermMemory,
    pub journal: Option<ReflectionJournal>,
    pub habits: HabitGenerator,
    pub base_influence: f64,
    pub locked_decay_multiplier: f64,
    /// While set, cycles bypass the persona entirely.
    pub kill_switch: bool,
}

impl PersonaRuntime {
    /// Fresh runtime with the standard genome.
    pub fn new(config: &KernelConfig) -> Result<Self, JournalError> {
        Self::with_genome(config, Genome::standard(config.persona_id.clone()))
    }

    pub fn with_genome(config: &KernelConfig, genome: Genome) -> Result<Self, JournalError> {
        let mut fsm = PersonaFsm::new(config.persona_id.clone());
        *fsm.affect_mut() = AffectState::default().with_decay_rate(config.affect.decay_rate);

        let journal = match &config.memory.journal_path {
            Some(path) => Some(ReflectionJournal::new(path.clone())?),
            None => None,
        };

        Ok(Self {
            fsm,
            genome: Arc::new(genome),
            stance: Stance::NEUTRAL,
            sampler: DeterministicSampler::new(config.sampler.time_bucket_secs),
            drift: StanceDriftController::new(config.drift.history_window, config.drift.threshold),
            memory: ShortTermMemory::new(config.memory.capacity),
            journal,
            habits: HabitGenerator::default(),
            base_influence: config.engine.base_influence,
            locked_decay_multiplier: config.affect.locked_decay_multiplier,
            kill_switch: false,
        })
    }

    /// Adopt a new stance: reshape the genome and reset the mood baseline.
    pub fn set_stance(&mut self, stance: Stance) {
        let stance = stance.clamped();
        self.genome = Arc::new(self.genome.with_stance(stance));
        self.fsm.affect_mut().set_baseline(affect_baseline(stance));
        self.stance = stance;
        log::debug!(
            "[PersonaRuntime] Stance set: rigor={:.2} warmth={:.2} chaos={:.2}",
            stance.rigor,
            stance.warmth,
            stance.chaos
        );
    }

    pub fn set_kill_switch(&mut self, engaged: bool) {
        if engaged {
            log::warn!("[PersonaRuntime] Persona kill switch engaged");
        } else if self.kill_switch {
            log::info!("[PersonaRuntime] Persona kill switch released");
        }
        self.kill_switch = engaged;
    }

    /// Replace the genome wholesale.
    pub fn replace_genome(&mut self, genome: Genome) {
        self.genome = Arc::new(genome);
    }

    /// Drift of recent outputs against the current stance.
    pub fn check_drift(&self) -> Option<DriftReport> {
        self.drift.check(self.stance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Pad;

    #[test]
    fn test_set_stance_is_copy_on_write() {
        let mut rt = PersonaRuntime::new(&KernelConfig::default()).unwrap();
        let before = Arc::clone(&rt.genome);
        rt.set_stance(Stance::new(0.9, 0.2, 0.1));

        assert!(!Arc::ptr_eq(&before, &rt.genome));
        assert_eq!(before.locus("logical_rigor").unwrap().range_default(), Some(0.7));
        assert!((rt.genome.locus("logical_rigor").unwrap().range_default().unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(rt.fsm.affect().baseline(), affect_baseline(Stance::new(0.9, 0.2, 0.1)));
        assert_eq!(rt.stance, Stance::new(0.9, 0.2, 0.1));
    }

    #[test]
    fn test_config_is_applied() {
        let mut config = KernelConfig::default();
        config.affect.decay_rate = 0.5;
        config.memory.capacity = 4;
        let rt = PersonaRuntime::new(&config).unwrap();
        assert_eq!(rt.fsm.affect().decay_rate(), 0.5);
        assert_eq!(rt.memory.capacity(), 4);
        assert!(rt.journal.is_none());
        assert_eq!(rt.fsm.affect().current(), Pad::NEUTRAL);
    }

    #[test]
    fn test_no_drift_without_history() {
        let rt = PersonaRuntime::new(&KernelConfig::default()).unwrap();
        assert!(rt.check_drift().is_none());
    }
}
