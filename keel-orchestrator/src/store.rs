//! In-memory run store
//!
//! Holds the runs of this process with their logs. Runs are written only by
//! the task executing them; readers get copies.
//!
//! A store built with [`RunStore::with_capacity`] keeps at most that many
//! runs: each insert past the limit drops the oldest finished runs. Runs
//! still pending or running are never dropped, so the limit can be exceeded
//! while they are in flight.

use keel_core::domain::log::LogEntry;
use keel_core::domain::run::PipelineRun;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::run_log::RunLog;

struct Entry {
    run: PipelineRun,
    log: RunLog,
}

#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<Uuid, Entry>>,
    capacity: Option<usize>,
}

impl RunStore {
    /// A store that keeps every run
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps at most `capacity` runs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: RwLock::default(),
            capacity: Some(capacity),
        }
    }

    /// The most runs kept, if bounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn insert(&self, run: &PipelineRun, log: RunLog) {
        let mut runs = self.runs.write().await;
        runs.insert(
            run.id,
            Entry {
                run: run.clone(),
                log,
            },
        );

        if let Some(capacity) = self.capacity {
            evict_finished(&mut runs, capacity);
        }
    }

    /// Replaces the stored state of a run; unknown runs are ignored
    pub async fn update(&self, run: &PipelineRun) {
        if let Some(entry) = self.runs.write().await.get_mut(&run.id) {
            entry.run = run.clone();
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<PipelineRun> {
        self.runs.read().await.get(&id).map(|e| e.run.clone())
    }

    /// Every run, oldest first
    pub async fn list(&self) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = self
            .runs
            .read()
            .await
            .values()
            .map(|e| e.run.clone())
            .collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    pub async fn logs(&self, id: Uuid) -> Option<Vec<LogEntry>> {
        self.runs.read().await.get(&id).map(|e| e.log.snapshot())
    }
}

/// Drops the oldest finished runs until `runs` fits in `capacity`
fn evict_finished(runs: &mut HashMap<Uuid, Entry>, capacity: usize) {
    let excess = runs.len().saturating_sub(capacity);
    if excess == 0 {
        return;
    }

    let mut finished: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = runs
        .values()
        .filter(|e| e.run.status.is_terminal())
        .map(|e| (e.run.created_at, e.run.id))
        .collect();
    finished.sort();

    for (_, id) in finished.into_iter().take(excess) {
        runs.remove(&id);
        debug!("Evicted run {} from the store", id);
    }
}
