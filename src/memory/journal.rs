//! Reflection journal: append-only JSONL record of persona evolution.
//!
//! One line per interaction. [`ReflectionJournal::recent`] reads the file
//! backwards in fixed-size chunks so tailing a large journal stays cheap.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persona::{FsmStatus, Pad, PersonaState};

const TAIL_CHUNK: u64 = 1024;
const SHORTHAND_CHARS: usize = 50;
const BACKGROUND_CONTEXT: &str = "background_process";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub interaction_id: u64,
    pub state: PersonaState,
    pub affect: Pad,
    pub intimacy: f64,
    pub context_shorthand: String,
}

#[derive(Debug, Clone)]
pub struct ReflectionJournal {
    path: PathBuf,
}

impl ReflectionJournal {
    /// Open (or prepare to create) a journal at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry built from the FSM status.
    pub fn log_entry(
        &self,
        status: &FsmStatus,
        user_input: Option<&str>,
    ) -> Result<JournalEntry, JournalError> {
        let context_shorthand = match user_input {
            Some(text) if !text.is_empty() => text.chars().take(SHORTHAND_CHARS).collect(),
            _ => BACKGROUND_CONTEXT.to_string(),
        };
        let entry = JournalEntry {
            timestamp: Utc::now(),
            interaction_id: status.interaction_count,
            state: status.state,
            affect: status.affect,
            intimacy: status.intimacy_level,
            context_shorthand,
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(entry)
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalEntry>, JournalError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        let mut pointer = file.seek(SeekFrom::End(0))?;
        let mut carry: Vec<u8> = Vec::new();

        while results.len() < limit && pointer > 0 {
            let step = TAIL_CHUNK.min(pointer);
            pointer -= step;
            file.seek(SeekFrom::Start(pointer))?;
            let mut chunk = vec![0u8; step as usize];
            file.read_exact(&mut chunk)?;
            chunk.extend_from_slice(&carry);

            // The first segment may be a partial line; keep it for the next round.
            let mut lines: Vec<&[u8]> = chunk.split(|b| *b == b'\n').collect();
            let head = lines.remove(0).to_vec();
            for line in lines.into_iter().rev() {
                if results.len() >= limit {
                    break;
                }
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                results.push(serde_json::from_slice(line)?);
            }
            carry = head;
        }

        // Whatever remains at the start of the file is the oldest full line.
        if results.len() < limit && !carry.iter().all(u8::is_ascii_whitespace) {
            results.push(serde_json::from_slice(&carry)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(count: u64) -> FsmStatus {
        FsmStatus {
            persona_id: "p".into(),
            state: PersonaState::Stable,
            interaction_count: count,
            intimacy_level: 0.3,
            uptime_secs: 0.0,
            affect: Pad::new(0.1, 0.2, 0.3),
        }
    }

    #[test]
    fn test_recent_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ReflectionJournal::new(dir.path().join("logs").join("journal.jsonl")).unwrap();
        // Enough lines to span several tail chunks.
        for i in 0..60 {
            journal.log_entry(&status(i), Some("hello there")).unwrap();
        }
        let recent = journal.recent(5).unwrap();
        let ids: Vec<u64> = recent.iter().map(|e| e.interaction_id).collect();
        assert_eq!(ids, vec![59, 58, 57, 56, 55]);

        let all = journal.recent(1000).unwrap();
        assert_eq!(all.len(), 60);
        assert_eq!(all.last().unwrap().interaction_id, 0);
    }

    #[test]
    fn test_context_shorthand() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ReflectionJournal::new(dir.path().join("j.jsonl")).unwrap();
        let long = "x".repeat(80);
        assert_eq!(journal.log_entry(&status(1), Some(&long)).unwrap().context_shorthand.len(), 50);
        assert_eq!(
            journal.log_entry(&status(2), None).unwrap().context_shorthand,
            "background_process"
        );
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ReflectionJournal::new(dir.path().join("none.jsonl")).unwrap();
        assert!(journal.recent(3).unwrap().is_empty());
    }
}
