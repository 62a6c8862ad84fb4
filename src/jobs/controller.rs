//! Lifecycle orchestration for the request layer.
//!
//! Resolves job IDs through the [`JobRegistry`] and drives the lifecycle
//! contract. `stop` is the only path that evicts a job: stop, clean, remove.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::job::JobDetails;
use super::kind::{JobSpec, SubmitRequest};
use super::registry::{JobRegistry, RegistrySummary};
use crate::error::JobError;

/// Entry point for every externally requested lifecycle operation.
#[derive(Clone)]
pub struct JobController {
    registry: Arc<JobRegistry>,
}

impl JobController {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Validate a submission, register the job and start it.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Uuid, JobError> {
        let spec = JobSpec::try_from(request)?;
        let kind = spec.kind();
        let id = self.registry.create(spec).await?;

        let job = self.registry.get(id).await?;
        if let Err(e) = job.start().await {
            warn!(job_id = %id, error = %e, "Failed to start job");
            self.registry.remove(id).await;
            return Err(e);
        }

        info!(job_id = %id, kind = %kind, "Job submitted");
        Ok(id)
    }

    pub async fn halt(&self, id: Uuid) -> Result<(), JobError> {
        self.registry.get(id).await?.halt().await
    }

    pub async fn resume(&self, id: Uuid) -> Result<(), JobError> {
        self.registry.get(id).await?.resume().await
    }

    /// Stop the job, release its resources and evict it.
    pub async fn stop(&self, id: Uuid) -> Result<(), JobError> {
        let job = self.registry.get(id).await?;
        job.stop().await?;
        job.clean().await?;
        // A concurrent stop may already have evicted it.
        self.registry.remove(id).await;
        Ok(())
    }

    pub async fn details(&self, id: Uuid) -> Result<JobDetails, JobError> {
        Ok(self.registry.get(id).await?.details())
    }

    /// Details of every live job.
    pub async fn list(&self) -> Vec<JobDetails> {
        self.registry
            .list()
            .await
            .iter()
            .map(|job| job.details())
            .collect()
    }

    pub async fn summary(&self) -> RegistrySummary {
        self.registry.summary().await
    }

    /// Stop and evict every live job.
    pub async fn shutdown(&self) {
        let ids = self.registry.ids().await;
        let stops = ids.iter().map(|id| async move { (*id, self.stop(*id).await) });

        for (id, result) in futures::future::join_all(stops).await {
            match result {
                Ok(()) => {}
                Err(JobError::NotFound { .. }) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Failed to stop job during shutdown");
                    // Never started, or wedged: drop it regardless.
                    self.registry.remove(id).await;
                }
            }
        }
        info!(count = ids.len(), "All jobs stopped");
    }
}
