//! In-memory job store.
//!
//! Jobs are held as `Arc` snapshots. A write clones the current snapshot,
//! applies the change and swaps the `Arc` under a short write lock, so
//! readers always see a whole job and never wait on deployment work.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::ProvisionError;
use crate::state_machine::{JobStatus, ProvisioningJob};

pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<ProvisioningJob>>>,
    sequence: AtomicU64,
    max_jobs: usize,
}

impl JobStore {
    /// Keeps at most `max_jobs` jobs, evicting the oldest finished ones.
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            max_jobs: max_jobs.max(1),
        }
    }

    /// Allocates `job-<unix-seconds>-<sequence>`.
    pub fn next_id(&self) -> (String, u64) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        (format!("job-{}-{sequence}", Utc::now().timestamp()), sequence)
    }

    pub async fn insert(&self, job: ProvisioningJob) -> Arc<ProvisioningJob> {
        let job = Arc::new(job);
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), Arc::clone(&job));

        if jobs.len() > self.max_jobs {
            let mut finished: Vec<(u64, String)> = jobs
                .values()
                .filter(|j| j.status.is_terminal())
                .map(|j| (j.sequence, j.id.clone()))
                .collect();
            finished.sort_unstable();
            let excess = jobs.len() - self.max_jobs;
            for (_, id) in finished.into_iter().take(excess) {
                jobs.remove(&id);
                tracing::debug!(job_id = %id, "evicted finished job");
            }
        }
        job
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ProvisioningJob>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Applies `f` to a copy of the job and publishes the copy.
    pub async fn update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ProvisioningJob) -> R,
    ) -> Result<R, ProvisionError> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs
            .get_mut(id)
            .ok_or_else(|| ProvisionError::JobNotFound(id.to_string()))?;
        let mut next = ProvisioningJob::clone(slot);
        let out = f(&mut next);
        next.updated_at = Utc::now();
        *slot = Arc::new(next);
        Ok(out)
    }

    /// Newest first, optionally filtered by status. The count is of all
    /// stored jobs.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> (Vec<Arc<ProvisioningJob>>, usize) {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Arc<ProvisioningJob>> = jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        matching.truncate(limit);
        (matching, jobs.len())
    }
}
