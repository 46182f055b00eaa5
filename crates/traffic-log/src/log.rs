//! Bounded Traffic Log Implementation

use crate::TrafficEntry;
use std::collections::VecDeque;

/// Default number of retained exchanges
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded FIFO of adapter exchanges.
///
/// Appends never reorder or deduplicate. Once `capacity` entries are held the
/// oldest one is evicted for each new append.
#[derive(Debug, Clone)]
pub struct TrafficLog {
    /// Retained entries, oldest at the front
    entries: VecDeque<TrafficEntry>,
    /// Maximum retained entries
    capacity: usize,
    /// Total entries appended since creation (for statistics)
    total_appended: usize,
}

impl TrafficLog {
    /// Create a new log retaining at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Create a log with the default capacity (10 entries)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Record an exchange stamped with the current time
    pub fn append(&mut self, command: impl Into<String>, response: impl Into<String>) -> TrafficEntry {
        let entry = TrafficEntry::new(command, response);
        self.push(entry.clone());
        entry
    }

    /// Record a pre-built entry (evicts the oldest if full)
    pub fn push(&mut self, entry: TrafficEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_appended += 1;
    }

    /// Copy of the retained entries in insertion order (oldest first)
    pub fn snapshot(&self) -> Vec<TrafficEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Read the last N entries (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<TrafficEntry> {
        self.entries.iter().rev().take(count).cloned().collect()
    }

    /// Most recent entry, if any
    pub fn latest(&self) -> Option<&TrafficEntry> {
        self.entries.back()
    }

    /// Get the number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the log capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get total entries appended (including evicted ones)
    pub fn total_appended(&self) -> usize {
        self.total_appended
    }

    /// Empty the log
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TrafficLog {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
