//! Event record and the closed set of event types.
//!
//! An [`Event`] is immutable once built: every field is private and only
//! exposed through accessors. Consumers on the bus receive `&Event` and
//! the log stores owned copies, so nothing downstream can rewrite history.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event id sequence
// ---------------------------------------------------------------------------

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Generate the next event id: `evt_<unix-micros>_<sequence>`.
///
/// The timestamp prefix keeps ids roughly time ordered; the process-wide
/// sequence suffix guarantees uniqueness within one process even when two
/// events are created in the same microsecond.
pub fn next_event_id() -> String {
    let seq = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("evt_{}_{:06}", Utc::now().timestamp_micros(), seq)
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Closed enumeration of event types published on the kernel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Raw user input reached the persona layer.
    PersonaInput,
    /// The persona FSM was evaluated (and possibly changed state).
    PersonaStateChanged,
    /// Persona influence was degraded for a strict scene.
    PersonaDegraded,
    /// A trait projection was produced.
    PersonaProjection,
    /// Scenario analysis finished.
    SceneAnalyzed,
    /// Stance drift check finished.
    DriftChecked,
    /// Trait sampling finished.
    TraitsSampled,
    /// The final artifact is ready for the caller.
    ArtifactReady,
    /// Short-term memory was refined (and possibly pruned).
    MemoryRefined,
    /// A kernel snapshot was captured.
    SnapshotCreated,
    /// Kernel started.
    SystemStart,
    /// Kernel stopped.
    SystemStop,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [EventType; 12] = [
        EventType::PersonaInput,
        EventType::PersonaStateChanged,
        EventType::PersonaDegraded,
        EventType::PersonaProjection,
        EventType::SceneAnalyzed,
        EventType::DriftChecked,
        EventType::TraitsSampled,
        EventType::ArtifactReady,
        EventType::MemoryRefined,
        EventType::SnapshotCreated,
        EventType::SystemStart,
        EventType::SystemStop,
    ];

    /// Wire name (snake_case), identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PersonaInput => "persona_input",
            EventType::PersonaStateChanged => "persona_state_changed",
            EventType::PersonaDegraded => "persona_degraded",
            EventType::PersonaProjection => "persona_projection",
            EventType::SceneAnalyzed => "scene_analyzed",
            EventType::DriftChecked => "drift_checked",
            EventType::TraitsSampled => "traits_sampled",
            EventType::ArtifactReady => "artifact_ready",
            EventType::MemoryRefined => "memory_refined",
            EventType::SnapshotCreated => "snapshot_created",
            EventType::SystemStart => "system_start",
            EventType::SystemStop => "system_stop",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Immutable event record.
///
/// Build with [`Event::new`] and the `with_*` builder methods; once the
/// value is handed to [`EventBus::publish`](crate::events::EventBus::publish)
/// it is never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: String,
    #[serde(rename = "type")]
    event_type: EventType,
    source: String,
    data: BTreeMap<String, Value>,
    timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, Value>,
}

impl Event {
    /// Create a new event with a fresh id and the current UTC time.
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            id: next_event_id(),
            event_type,
            source: source.into(),
            data: BTreeMap::new(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Replace the whole data mapping.
    pub fn with_data_map(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the timestamp (replay and tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Trace id carried in metadata by pipeline events, if any.
    pub fn trace_id(&self) -> Option<&str> {
        self.metadata.get("trace_id").and_then(Value::as_str)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event({}, source={}, id={})",
            self.event_type, self.source, self.id
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::new(EventType::SystemStart, "test");
        let b = Event::new(EventType::SystemStart, "test");
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("evt_"));
    }

    #[test]
    fn test_event_type_wire_names_match_serde() {
        for ty in EventType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn test_builder_and_trace_id() {
        let event = Event::new(EventType::SceneAnalyzed, "L0_ScenarioAnalysis")
            .with_data("scene", "STRICT_FACT")
            .with_metadata("trace_id", "TR-1");
        assert_eq!(event.data()["scene"], "STRICT_FACT");
        assert_eq!(event.trace_id(), Some("TR-1"));
        assert_eq!(event.source(), "L0_ScenarioAnalysis");
    }

    #[test]
    fn test_timestamp_serializes_as_iso8601() {
        let event = Event::new(EventType::SystemStop, "test");
        let value = serde_json::to_value(&event).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(value["type"], "system_stop");
    }
}
