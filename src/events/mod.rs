//! Kernel event system.
//!
//! Every pipeline stage reports what it did by publishing an [`Event`].
//! The [`EventBus`] appends each event to an [`EventLog`] before
//! dispatching it to subscribers, so the log is a complete, ordered
//! record that can be dumped to disk and replayed.

// ---------------------------------------------------------------------------
// Core infrastructure modules
// ---------------------------------------------------------------------------

/// Event record and event type enumeration.
pub mod base_event;

/// Publish/subscribe dispatcher.
pub mod event_bus;

/// Append-only log with file persistence.
pub mod event_log;

// ---------------------------------------------------------------------------
// Convenience re-exports
// ---------------------------------------------------------------------------

pub use base_event::{next_event_id, Event, EventType};
pub use event_bus::{
    BusConfig, BusError, BusStats, EventBus, EventHandler, FnHandler, HandlerError, HandlerId,
};
pub use event_log::{EventLog, EventLogError};
