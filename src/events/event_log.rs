//! Append-only event log, the source of truth for replay.
//!
//! The in-memory log is guarded by a mutex because it is written from the
//! publishing side and read from anywhere (stats, replay, persistence).
//!
//! File format: an 8-byte magic header followed by length-prefixed frames,
//! `[4-byte LE length][JSON event]...`. Timestamps inside each frame are
//! ISO-8601 strings.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use super::base_event::{Event, EventType};

/// Magic header identifying an event log dump.
const LOG_MAGIC: &[u8; 8] = b"PKEVLOG1";

/// Errors raised while dumping or restoring the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Frame payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file is not an event log or a frame is truncated.
    #[error("Corrupt event log: {0}")]
    Corrupt(String),
}

/// Ordered, append-only store of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the end of the log.
    pub fn append(&self, event: Event) {
        self.entries.lock().push(event);
    }

    /// Events whose timestamp lies in `[start, end]` (both inclusive).
    ///
    /// A missing `end` means "now".
    pub fn get_range(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Vec<Event> {
        let end = end.unwrap_or_else(Utc::now);
        self.entries
            .lock()
            .iter()
            .filter(|e| start <= e.timestamp() && e.timestamp() <= end)
            .cloned()
            .collect()
    }

    /// All events of the given type, in log order.
    pub fn get_by_type(&self, event_type: EventType) -> Vec<Event> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Copy of the whole log.
    pub fn get_all(&self) -> Vec<Event> {
        self.entries.lock().clone()
    }

    /// Destructive: drop every recorded event.
    pub fn clear(&self) {
        self.entries.lock().clear();
        log::warn!("[EventLog] Event log cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Dump the log to `path`, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<usize, EventLogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Snapshot under the lock, serialize outside of it.
        let events = self.get_all();
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(LOG_MAGIC)?;
        for event in &events {
            let buf = serde_json::to_vec(event)?;
            let len = u32::try_from(buf.len())
                .map_err(|_| EventLogError::Corrupt(format!("event {} too large", event.id())))?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
        }
        writer.flush()?;

        log::info!(
            "[EventLog] Saved {} events -> {}",
            events.len(),
            path.display()
        );
        Ok(events.len())
    }

    /// Replace the log contents with the events stored at `path`.
    ///
    /// The current contents are only replaced once the whole file parsed.
    pub fn load_from_file(&self, path: &Path) -> Result<usize, EventLogError> {
        let events = read_frames(path)?;
        let count = events.len();
        *self.entries.lock() = events;
        log::info!(
            "[EventLog] Loaded {} events from {}",
            count,
            path.display()
        );
        Ok(count)
    }
}

fn read_frames(path: &Path) -> Result<Vec<Event>, EventLogError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|_| EventLogError::Corrupt("missing header".into()))?;
    if &magic != LOG_MAGIC {
        return Err(EventLogError::Corrupt("bad magic header".into()));
    }

    let mut events = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf);
        // Only what the file actually holds is buffered, whatever the prefix claims.
        let mut buf = Vec::new();
        reader.by_ref().take(u64::from(len)).read_to_end(&mut buf)?;
        if buf.len() != len as usize {
            return Err(EventLogError::Corrupt(format!(
                "truncated frame after {} events ({} of {} bytes)",
                events.len(),
                buf.len(),
                len
            )));
        }
        events.push(serde_json::from_slice(&buf)?);
    }
    Ok(events)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_at(ty: EventType, offset_secs: i64, base: DateTime<Utc>) -> Event {
        Event::new(ty, "test").with_timestamp(base + Duration::seconds(offset_secs))
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let base = Utc::now() - Duration::hours(1);
        let log = EventLog::new();
        log.append(event_at(EventType::SystemStart, 0, base));
        log.append(event_at(EventType::SceneAnalyzed, 10, base));
        log.append(event_at(EventType::SystemStop, 20, base));

        let hits = log.get_range(base, Some(base + Duration::seconds(10)));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].event_type(), EventType::SystemStart);
        assert_eq!(hits[1].event_type(), EventType::SceneAnalyzed);

        // Open end defaults to now.
        assert_eq!(log.get_range(base, None).len(), 3);
    }

    #[test]
    fn test_get_by_type_preserves_order() {
        let log = EventLog::new();
        let a = Event::new(EventType::DriftChecked, "a");
        let b = Event::new(EventType::SceneAnalyzed, "b");
        let c = Event::new(EventType::DriftChecked, "c");
        log.append(a.clone());
        log.append(b);
        log.append(c.clone());

        let drift = log.get_by_type(EventType::DriftChecked);
        assert_eq!(drift, vec![a, c]);
    }

    #[test]
    fn test_file_round_trip_preserves_order_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.bin");

        let log = EventLog::new();
        for i in 0..5 {
            log.append(
                Event::new(EventType::TraitsSampled, "sampler")
                    .with_data("index", i)
                    .with_metadata("trace_id", format!("TR-{i}")),
            );
        }
        assert_eq!(log.save_to_file(&path).unwrap(), 5);

        let restored = EventLog::new();
        restored.append(Event::new(EventType::SystemStart, "stale"));
        assert_eq!(restored.load_from_file(&path).unwrap(), 5);
        assert_eq!(restored.get_all(), log.get_all());
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"not an event log").unwrap();

        let log = EventLog::new();
        assert!(matches!(
            log.load_from_file(&path),
            Err(EventLogError::Corrupt(_))
        ));
    }

    #[test]
    fn test_oversized_frame_length_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.bin");
        let mut bytes = LOG_MAGIC.to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"{\"id\":");
        std::fs::write(&path, bytes).unwrap();

        let log = EventLog::new();
        log.append(Event::new(EventType::SystemStart, "kept"));
        assert!(matches!(
            log.load_from_file(&path),
            Err(EventLogError::Corrupt(_))
        ));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_clear_empties_log() {
        let log = EventLog::new();
        log.append(Event::new(EventType::SystemStart, "x"));
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
