//! # persona-kernel
//!
//! An event-sourced orchestration kernel for session-scoped LLM personas.
//!
//! The kernel turns raw user input into a system-prompt artifact through a
//! fixed cognitive pipeline, while keeping every stage auditable:
//!
//! - [`events`]: append-only event log and a single-consumer pub/sub bus
//! - [`modules`]: name-keyed module registry with lifecycle status
//! - [`persona`]: lifecycle FSM, PAD affect, genome, deterministic sampler,
//!   stance drift controller and prompt augmentation
//! - [`memory`]: saliency-evicting short-term memory and reflection journal
//! - [`pipeline`]: the cognitive director and its five steps
//! - [`service`]: [`PersonaService`], the kernel bootstrap and call surface
//!
//! Library code logs through the `log` facade; binaries decide where the
//! records go.

pub mod error;
pub mod evaluation;
pub mod events;
pub mod memory;
pub mod modules;
pub mod persona;
pub mod pipeline;
pub mod service;
pub mod utilities;

// Re-exports
pub use error::KernelError;
pub use pipeline::{Artifact, PipelineContext, Scene};
pub use service::PersonaService;
pub use utilities::{KernelConfig, CONTRACT_VERSION};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
