//! Persona lifecycle state machine wrapping the affective manifold.
//!
//! Transitions are plain single-step assignments with one guard: a LOCKED
//! persona refuses every transition except to LOCKED itself. The only way
//! out is [`PersonaFsm::set_locked`]`(false)`, which forces STABLE.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::affect::{AffectState, Pad};

/// Interaction count at which FORMING promotes to STABILIZING.
pub const STABILIZING_AT: u64 = 10;
/// Interaction count at which STABILIZING promotes to STABLE.
pub const STABLE_AT: u64 = 50;

/// Discrete persona lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonaState {
    /// Initial creation, high flexibility.
    Forming,
    /// Convergence phase.
    Stabilizing,
    /// Consistent persona.
    Stable,
    /// Minor adjustments based on feedback.
    Drifting,
    /// Hard consistency, no drift allowed.
    Locked,
}

impl PersonaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaState::Forming => "FORMING",
            PersonaState::Stabilizing => "STABILIZING",
            PersonaState::Stable => "STABLE",
            PersonaState::Drifting => "DRIFTING",
            PersonaState::Locked => "LOCKED",
        }
    }
}

impl fmt::Display for PersonaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PersonaState,
    pub to: PersonaState,
    pub interaction_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Read-only status view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsmStatus {
    pub persona_id: String,
    pub state: PersonaState,
    pub interaction_count: u64,
    pub intimacy_level: f64,
    /// Seconds since the last transition.
    pub uptime_secs: f64,
    pub affect: Pad,
}

/// Serialization boundary of the FSM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmSnapshot {
    pub persona_id: String,
    pub state: PersonaState,
    pub interaction_count: u64,
    pub intimacy_level: f64,
    #[serde(default)]
    pub history: Vec<Transition>,
    pub affect: AffectState,
}

#[derive(Debug, Clone)]
pub struct PersonaFsm {
    persona_id: String,
    state: PersonaState,
    interaction_count: u64,
    intimacy_level: f64,
    last_transition: DateTime<Utc>,
    history: Vec<Transition>,
    affect: AffectState,
}

impl PersonaFsm {
    pub fn new(persona_id: impl Into<String>) -> Self {
        Self::with_state(persona_id, PersonaState::Forming)
    }

    pub fn with_state(persona_id: impl Into<String>, state: PersonaState) -> Self {
        Self {
            persona_id: persona_id.into(),
            state,
            interaction_count: 0,
            intimacy_level: 0.0,
            last_transition: Utc::now(),
            history: Vec::new(),
            affect: AffectState::default(),
        }
    }

    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    pub fn state(&self) -> PersonaState {
        self.state
    }

    pub fn interaction_count(&self) -> u64 {
        self.interaction_count
    }

    pub fn intimacy_level(&self) -> f64 {
        self.intimacy_level
    }

    pub fn set_intimacy_level(&mut self, level: f64) {
        self.intimacy_level = level.clamp(0.0, 1.0);
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn affect(&self) -> &AffectState {
        &self.affect
    }

    pub fn affect_mut(&mut self) -> &mut AffectState {
        &mut self.affect
    }

    /// Move to `target`. Returns `false` (and changes nothing) when the
    /// persona is LOCKED and `target` is not LOCKED.
    pub fn transition_to(&mut self, target: PersonaState) -> bool {
        if self.state == PersonaState::Locked && target != PersonaState::Locked {
            log::warn!(
                "[PersonaFsm] Attempted to unlock a LOCKED persona '{}' via {}. Transition denied.",
                self.persona_id,
                target
            );
            return false;
        }
        self.apply(target);
        true
    }

    fn apply(&mut self, target: PersonaState) {
        let from = self.state;
        self.state = target;
        self.last_transition = Utc::now();
        self.history.push(Transition {
            from,
            to: target,
            interaction_count: self.interaction_count,
            timestamp: self.last_transition,
        });
        log::info!(
            "[PersonaFsm] State transition: {} -> {} (interactions: {})",
            from,
            target,
            self.interaction_count
        );
    }

    /// Count one interaction and apply the automatic forward promotions.
    pub fn record_interaction(&mut self) {
        self.interaction_count += 1;
        match self.state {
            PersonaState::Forming if self.interaction_count >= STABILIZING_AT => {
                self.transition_to(PersonaState::Stabilizing);
            }
            PersonaState::Stabilizing if self.interaction_count >= STABLE_AT => {
                self.transition_to(PersonaState::Stable);
            }
            _ => {}
        }
    }

    /// Lock, or explicitly unlock to STABLE (bypassing the LOCKED guard).
    pub fn set_locked(&mut self, locked: bool) -> bool {
        if locked {
            return self.transition_to(PersonaState::Locked);
        }
        self.apply(PersonaState::Stable);
        log::info!("[PersonaFsm] Persona '{}' unlocked -> STABLE", self.persona_id);
        true
    }

    pub fn is_locked(&self) -> bool {
        self.state == PersonaState::Locked
    }

    pub fn status(&self) -> FsmStatus {
        let uptime = Utc::now() - self.last_transition;
        FsmStatus {
            persona_id: self.persona_id.clone(),
            state: self.state,
            interaction_count: self.interaction_count,
            intimacy_level: self.intimacy_level,
            uptime_secs: uptime.num_milliseconds() as f64 / 1000.0,
            affect: self.affect.get_affect(),
        }
    }

    pub fn to_snapshot(&self) -> FsmSnapshot {
        FsmSnapshot {
            persona_id: self.persona_id.clone(),
            state: self.state,
            interaction_count: self.interaction_count,
            intimacy_level: self.intimacy_level,
            history: self.history.clone(),
            affect: self.affect.clone(),
        }
    }

    /// Restore from a snapshot. The LOCKED guard does not apply: restoring
    /// is not a transition.
    pub fn restore(&mut self, snapshot: &FsmSnapshot) {
        self.persona_id = snapshot.persona_id.clone();
        self.state = snapshot.state;
        self.interaction_count = snapshot.interaction_count;
        self.intimacy_level = snapshot.intimacy_level.clamp(0.0, 1.0);
        self.history = snapshot.history.clone();
        self.affect = snapshot.affect.clone();
        self.last_transition = Utc::now();
    }

    pub fn from_snapshot(snapshot: &FsmSnapshot) -> Self {
        let mut fsm = Self::new(snapshot.persona_id.clone());
        fsm.restore(snapshot);
        fsm
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_interactions_stay_forming() {
        let mut fsm = PersonaFsm::new("p");
        for _ in 0..5 {
            fsm.record_interaction();
        }
        assert_eq!(fsm.state(), PersonaState::Forming);
        assert_eq!(fsm.interaction_count(), 5);
    }

    #[test]
    fn test_ten_interactions_promote_to_stabilizing() {
        let mut fsm = PersonaFsm::new("p");
        for _ in 0..10 {
            fsm.record_interaction();
        }
        assert_eq!(fsm.state(), PersonaState::Stabilizing);
        assert_eq!(fsm.history().len(), 1);
        assert_eq!(fsm.history()[0].interaction_count, 10);
    }

    #[test]
    fn test_fifty_interactions_promote_to_stable() {
        let mut fsm = PersonaFsm::new("p");
        for _ in 0..50 {
            fsm.record_interaction();
        }
        assert_eq!(fsm.state(), PersonaState::Stable);
        let states: Vec<PersonaState> = fsm.history().iter().map(|t| t.to).collect();
        assert_eq!(states, vec![PersonaState::Stabilizing, PersonaState::Stable]);
    }

    #[test]
    fn test_locked_refuses_every_other_state() {
        let mut fsm = PersonaFsm::new("p");
        assert!(fsm.transition_to(PersonaState::Locked));
        for target in [
            PersonaState::Forming,
            PersonaState::Stabilizing,
            PersonaState::Stable,
            PersonaState::Drifting,
        ] {
            assert!(!fsm.transition_to(target));
            assert_eq!(fsm.state(), PersonaState::Locked);
        }
        assert!(fsm.transition_to(PersonaState::Locked));

        // Interactions do not promote a locked persona either.
        for _ in 0..20 {
            fsm.record_interaction();
        }
        assert_eq!(fsm.state(), PersonaState::Locked);
    }

    #[test]
    fn test_explicit_unlock_forces_stable() {
        let mut fsm = PersonaFsm::new("p");
        fsm.set_locked(true);
        assert!(fsm.is_locked());
        assert!(fsm.set_locked(false));
        assert_eq!(fsm.state(), PersonaState::Stable);
        assert!(fsm.transition_to(PersonaState::Drifting));
    }

    #[test]
    fn test_unrestricted_transitions_outside_locked() {
        let mut fsm = PersonaFsm::new("p");
        assert!(fsm.transition_to(PersonaState::Drifting));
        assert!(fsm.transition_to(PersonaState::Forming));
        assert!(fsm.transition_to(PersonaState::Stable));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut fsm = PersonaFsm::new("p");
        for _ in 0..12 {
            fsm.record_interaction();
        }
        fsm.set_intimacy_level(0.7);
        fsm.affect_mut().update(0.3, 0.2, -0.1);

        let json = serde_json::to_string(&fsm.to_snapshot()).unwrap();
        let snap: FsmSnapshot = serde_json::from_str(&json).unwrap();
        let restored = PersonaFsm::from_snapshot(&snap);

        assert_eq!(restored.state(), PersonaState::Stabilizing);
        assert_eq!(restored.interaction_count(), 12);
        assert_eq!(restored.intimacy_level(), 0.7);
        assert_eq!(restored.history(), fsm.history());
        assert_eq!(restored.affect(), fsm.affect());
        assert!(json.contains("\"STABILIZING\""));
    }

    #[test]
    fn test_intimacy_is_clamped() {
        let mut fsm = PersonaFsm::new("p");
        fsm.set_intimacy_level(1.7);
        assert_eq!(fsm.intimacy_level(), 1.0);
        fsm.set_intimacy_level(-0.2);
        assert_eq!(fsm.intimacy_level(), 0.0);
    }
}
