//! Per-run log buffer
//!
//! Collects the entries of one pipeline run: stage transitions and the
//! output of every build command. Entries are mirrored to `tracing` at debug
//! level so the process log stays readable while runs overlap.

use keel_core::domain::log::{LogEntry, LogLevel};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Shared, append-only log of one run
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: Uuid,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RunLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Adds a log entry to the buffer
    pub fn add(&self, entry: LogEntry) {
        tracing::debug!(run_id = %self.run_id, "{:?}: {}", entry.level, entry.message);
        self.lock().push(entry);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.add(LogEntry::new(LogLevel::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.add(LogEntry::new(LogLevel::Info, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.add(LogEntry::new(LogLevel::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.add(LogEntry::new(LogLevel::Error, message));
    }

    /// Copies every entry recorded so far
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if any entry's message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|e| e.message.contains(needle))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        // A panic while holding the lock cannot leave a Vec half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
