// File: collector/src/job_manager.rs
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{JobInfo, JobKey, JobStatus};

/// Result table of the worker pool. Only the newest job per key is kept.
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<JobKey, JobInfo>>>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new queued job unless one is already queued or running.
    /// Returns the new job id, or `None` when the submission is a duplicate.
    pub async fn try_enqueue(&self, key: &JobKey) -> Option<String> {
        let mut jobs = self.jobs.write().await;

        if let Some(existing) = jobs.get(key) {
            if existing.status.is_outstanding() {
                return None;
            }
        }

        let job_id = Uuid::new_v4().to_string();
        let job_info = JobInfo {
            job_id: job_id.clone(),
            request_name: key.request_name.clone(),
            collection_type: key.collection_type,
            status: JobStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        jobs.insert(key.clone(), job_info);

        info!("Queued job {} for {}", job_id, key);
        Some(job_id)
    }

    /// Moves a queued job to running. Fails when the job was purged or replaced.
    pub async fn mark_running(&self, key: &JobKey, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(key) {
            Some(job) if job.job_id == job_id && job.status == JobStatus::Queued => {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub async fn complete_job(&self, key: &JobKey, job_id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(key).filter(|job| job.job_id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            info!("Job {} for {} completed successfully", job_id, key);
        }
    }

    pub async fn fail_job(&self, key: &JobKey, job_id: &str, error_message: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(key).filter(|job| job.job_id == job_id) {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error_message = Some(error_message.clone());
            warn!("Job {} for {} failed: {}", job_id, key, error_message);
        }
    }

    pub async fn get_job(&self, key: &JobKey) -> Option<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.get(key).cloned()
    }

    pub async fn remove_job(&self, key: &JobKey) -> Option<JobInfo> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(key)
    }

    /// Drops finished jobs older than `max_hours`. Outstanding jobs are kept.
    pub async fn cleanup_old_jobs(&self, max_hours: i64) -> u32 {
        let mut jobs = self.jobs.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_hours);
        let initial_count = jobs.len();

        jobs.retain(|key, job| {
            let finished_at = job.completed_at.unwrap_or(job.queued_at);
            let should_keep = job.status.is_outstanding() || finished_at > cutoff;
            if !should_keep {
                info!("Cleaned up old job: {} ({})", job.job_id, key);
            }
            should_keep
        });

        let cleaned = initial_count - jobs.len();
        if cleaned > 0 {
            info!("Cleaned up {} old jobs older than {}h", cleaned, max_hours);
        }
        cleaned as u32
    }

    pub async fn get_running_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.values()
            .filter(|job| matches!(job.status, JobStatus::Running))
            .cloned()
            .collect()
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<JobInfo> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        all
    }
}
