//! Registry of live jobs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::job::{Job, JobHandle};
use super::kind::JobSpec;
use super::state::JobStatus;
use super::workload::{ExportWork, SimpleWork};
use crate::config::JobSettings;
use crate::error::JobError;

/// Every read and write of the job map goes through one `RwLock`.
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<dyn Job>>>,
    settings: JobSettings,
    /// Maximum live jobs (0 = unlimited).
    max_jobs: usize,
}

impl JobRegistry {
    /// Create a new registry.
    pub fn new(settings: JobSettings, max_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            settings,
            max_jobs,
        }
    }

    /// Build a job from a validated spec and make it reachable.
    ///
    /// The job is inserted in Submitted state; nothing is spawned.
    pub async fn create(&self, spec: JobSpec) -> Result<Uuid, JobError> {
        let mut jobs = self.jobs.write().await;

        if self.max_jobs > 0 && jobs.len() >= self.max_jobs {
            return Err(JobError::MaxJobsExceeded { max: self.max_jobs });
        }

        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let job: Arc<dyn Job> = match spec {
            JobSpec::Simple => Arc::new(JobHandle::new(id, SimpleWork::new(), &self.settings)),
            JobSpec::Export { from_date, to_date } => Arc::new(JobHandle::new(
                id,
                ExportWork::new(from_date, to_date),
                &self.settings,
            )),
        };
        jobs.insert(id, job);

        debug!(job_id = %id, "Job registered");
        Ok(id)
    }

    /// Get a job by ID.
    pub async fn get(&self, id: Uuid) -> Result<Arc<dyn Job>, JobError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound { id })
    }

    /// Evict a job. Returns it if it was still registered.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<dyn Job>> {
        let removed = self.jobs.write().await.remove(&id);
        if removed.is_some() {
            debug!(job_id = %id, "Job evicted");
        }
        removed
    }

    /// All registered jobs.
    pub async fn list(&self) -> Vec<Arc<dyn Job>> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// All registered job IDs.
    pub async fn ids(&self) -> Vec<Uuid> {
        self.jobs.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Count of registered jobs per status.
    pub async fn summary(&self) -> RegistrySummary {
        let jobs = self.jobs.read().await;

        let mut summary = RegistrySummary::default();
        for job in jobs.values() {
            match job.details().status {
                JobStatus::Submitted => summary.submitted += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Halted => summary.halted += 1,
                JobStatus::Stopped => summary.stopped += 1,
            }
        }

        summary.total = jobs.len();
        summary
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(JobSettings::default(), 0)
    }
}

/// Summary of all registered jobs.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub submitted: usize,
    pub running: usize,
    pub halted: usize,
    pub stopped: usize,
}
