//! Adapter Traffic Log
//!
//! Keeps the most recent command/response exchanges of a diagnostic session
//! for inspection views.

mod log;

pub use log::{TrafficLog, DEFAULT_CAPACITY};

use serde::{Deserialize, Serialize};

/// One command/response exchange with the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEntry {
    /// Command sent to the adapter (e.g. "ATZ", "010C")
    pub command: String,
    /// Raw response text
    pub response: String,
    /// Time the entry was recorded (Unix ms)
    pub timestamp_ms: u64,
}

impl TrafficEntry {
    /// Create an entry stamped with the current time
    pub fn new(command: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
            timestamp_ms: unix_time_ms(),
        }
    }
}

/// Current wall clock time in Unix milliseconds
pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
