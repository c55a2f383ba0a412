//! Trace identifiers for pipeline cycles.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `TR-<yyyymmddHHMMSS>-<8 hex chars>`, e.g. `TR-20260101120000-1a2b3c4d`.
pub fn new_trace_id() -> String {
    trace_id_at(Utc::now())
}

pub fn trace_id_at(at: DateTime<Utc>) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("TR-{}-{}", at.format("%Y%m%d%H%M%S"), &simple[..8])
}
