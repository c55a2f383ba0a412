//! Persona system: lifecycle state, mood, genome, and prompt projection.
//!
//! # Architecture
//!
//! ```text
//! Stance (rigor, warmth, chaos)
//!   ↓  Genome::with_stance / affect_baseline
//! Genome (copy-on-write loci)  +  PersonaFsm { state, AffectState }
//!   ↓  DeterministicSampler (session + time bucket seed, affect warp)
//! Projection (trait id -> value)
//!   ↓  augmenter::augment (influence + intimacy gating)
//! System instructions  +  HabitGenerator quirks
//! ```
//!
//! The [`StanceDriftController`] closes the loop: it scores recent outputs
//! against the target stance and produces governance directives.

pub mod affect;
pub mod archetypes;
pub mod augmenter;
pub mod fsm;
pub mod genome;
pub mod habits;
pub mod sampler;
pub mod snapshot;
pub mod stance;

// Re-exports
pub use affect::{AffectState, Pad, WarpFactors};
pub use archetypes::affect_baseline;
pub use augmenter::{augment, Section};
pub use fsm::{FsmSnapshot, FsmStatus, PersonaFsm, PersonaState, Transition};
pub use genome::{Distribution, Genome, GenomeError, Locus, LocusCategory};
pub use habits::{Habit, HabitGenerator};
pub use sampler::{DeterministicSampler, Projection, SamplingError, TraitValue};
pub use snapshot::{PersonaSnapshot, SnapshotError};
pub use stance::{DriftReport, Stance, StanceDriftController};
