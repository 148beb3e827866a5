//! Job state: progress counters, results, and the per-job catch-all cache.
//!
//! Counters are atomics so pollers read progress without taking the job
//! lock; status, timestamps, and the result buffer sit behind a
//! readers-writer lock and are only mutated by the job's own worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use verifier_core::{Level, Verdict};

/// Lifecycle states. Transitions only move forward:
/// queued -> running -> (completed | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Per-address outcome: a verdict or an error message, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResult {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmailResult {
    pub fn verdict(email: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            email: email.into(),
            result: Some(verdict),
            error: None,
        }
    }

    pub fn error(email: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            result: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// One bulk verification job.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub level: Level,
    pub total: usize,
    pub store_results: bool,
    pub created_at: DateTime<Utc>,

    done: AtomicU64,
    failed: AtomicU64,
    state: RwLock<JobState>,
    results: RwLock<Vec<EmailResult>>,
    catch_all: RwLock<HashMap<String, bool>>,
}

impl Job {
    pub fn new(level: Level, total: usize, store_results: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            level,
            total,
            store_results,
            created_at: Utc::now(),
            done: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            state: RwLock::new(JobState {
                status: JobStatus::Queued,
                started_at: None,
                finished_at: None,
                error: None,
            }),
            results: RwLock::new(Vec::new()),
            catch_all: RwLock::new(HashMap::new()),
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn incr_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(dead_code)]
    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn mark_running(&self) {
        let mut state = self.state.write();
        if state.status == JobStatus::Queued {
            state.status = JobStatus::Running;
            state.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&self) {
        let mut state = self.state.write();
        if state.status == JobStatus::Running {
            state.status = JobStatus::Completed;
            state.finished_at = Some(Utc::now());
        }
    }

    /// Terminal failure. Unreachable from the ingest path today; kept for
    /// catastrophic conditions a future engine may hit.
    #[allow(dead_code)]
    pub fn mark_failed(&self, error: impl Into<String>) {
        let mut state = self.state.write();
        if state.status == JobStatus::Running {
            state.status = JobStatus::Failed;
            state.finished_at = Some(Utc::now());
            state.error = Some(error.into());
        }
    }

    pub fn add_result(&self, result: EmailResult) {
        if !self.store_results {
            return;
        }
        self.results.write().push(result);
    }

    /// A page of results plus the current total.
    pub fn results_page(&self, offset: usize, limit: usize) -> (Vec<EmailResult>, usize) {
        let results = self.results.read();
        let total = results.len();
        if offset >= total {
            return (Vec::new(), total);
        }
        let end = (offset + limit).min(total);
        (results[offset..end].to_vec(), total)
    }

    pub fn all_results(&self) -> Vec<EmailResult> {
        self.results.read().clone()
    }

    pub fn set_catch_all(&self, domain: &str, is_catch_all: bool) {
        self.catch_all
            .write()
            .insert(domain.to_string(), is_catch_all);
    }

    pub fn catch_all(&self, domain: &str) -> Option<bool> {
        self.catch_all.read().get(domain).copied()
    }

    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        match self.state.read().finished_at {
            Some(finished_at) => finished_at < cutoff,
            None => false,
        }
    }

    /// Consistent point-in-time view for pollers.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read();
        JobSnapshot {
            id: self.id.clone(),
            level: self.level,
            total: self.total,
            done: self.done(),
            failed: self.failed(),
            status: state.status,
            created_at: self.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            error: state.error.clone(),
            store_results: self.store_results,
        }
    }
}

/// Serializable view of a job for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub level: Level,
    pub total: usize,
    pub done: u64,
    pub failed: u64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub store_results: bool,
}
