//! Job ownership and expiry.
//!
//! The manager owns every job for the process lifetime of the job. A janitor
//! task sweeps once a minute and drops jobs whose `finished_at` is older than
//! the configured TTL; it holds only a weak reference so dropping the manager
//! stops the sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use verifier_core::Level;

use super::job::Job;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct JobManager {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    result_ttl: Duration,
}

impl JobManager {
    /// Create a manager and start its janitor.
    pub fn new(result_ttl: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            result_ttl,
        });
        tokio::spawn(janitor(Arc::downgrade(&manager)));
        manager
    }

    pub fn create(&self, level: Level, total: usize, store_results: bool) -> Arc<Job> {
        let job = Arc::new(Job::new(level, total, store_results));
        self.jobs.write().insert(job.id.clone(), job.clone());
        job
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.read().get(id).cloned()
    }

    pub fn delete(&self, id: &str) {
        self.jobs.write().remove(id);
    }

    /// Drop every finished job older than the TTL. Scan under the read lock,
    /// then take the write lock only if something actually expired.
    fn sweep(&self) {
        if self.result_ttl.is_zero() {
            return;
        }
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.result_ttl).unwrap_or(chrono::Duration::zero());

        let expired: Vec<String> = self
            .jobs
            .read()
            .iter()
            .filter(|(_, job)| job.is_expired(cutoff))
            .map(|(id, _)| id.clone())
            .collect();

        if expired.is_empty() {
            return;
        }
        debug!(count = expired.len(), "expiring finished jobs");
        let mut jobs = self.jobs.write();
        for id in expired {
            jobs.remove(&id);
        }
    }
}

async fn janitor(manager: Weak<JobManager>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // immediate first tick
    loop {
        interval.tick().await;
        let Some(manager) = manager.upgrade() else {
            return;
        };
        manager.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_delete() {
        let manager = JobManager::new(Duration::from_secs(900));
        let job = manager.create(Level::Mx, 3, true);
        assert_eq!(job.total, 3);

        let fetched = manager.get(&job.id).expect("job present");
        assert_eq!(fetched.id, job.id);

        manager.delete(&job.id);
        assert!(manager.get(&job.id).is_none());
        assert!(manager.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_finished_jobs() {
        let manager = JobManager::new(Duration::from_millis(10));

        let finished = manager.create(Level::Mx, 1, true);
        finished.mark_running();
        finished.mark_completed();

        let running = manager.create(Level::Mx, 1, true);
        running.mark_running();

        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.sweep();

        assert!(manager.get(&finished.id).is_none());
        assert!(manager.get(&running.id).is_some());
    }

    #[tokio::test]
    async fn test_sweep_noop_with_zero_ttl() {
        let manager = JobManager::new(Duration::ZERO);
        let job = manager.create(Level::Mx, 1, true);
        job.mark_running();
        job.mark_completed();
        manager.sweep();
        assert!(manager.get(&job.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_expires_on_schedule() {
        let manager = JobManager::new(Duration::from_secs(2));
        let job = manager.create(Level::Mx, 1, true);
        job.mark_running();
        job.mark_completed();

        // Within the TTL nothing is swept even after a janitor pass.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(manager.get(&job.id).is_some());

        // chrono clocks are not paused, so wait out the TTL in real time,
        // then let the next janitor tick fire.
        tokio::time::resume();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(manager.get(&job.id).is_none());
    }
}
