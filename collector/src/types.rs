// File: collector/src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of artifact a collection request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Snapshot,
    Techsupport,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Snapshot => "snapshot",
            CollectionType::Techsupport => "techsupport",
        }
    }

    /// Finalizer guarding the collector state of requests of this kind.
    pub fn finalizer(&self) -> &'static str {
        match self {
            CollectionType::Snapshot => "snapshot.collection.fleet/finalizer",
            CollectionType::Techsupport => "techsupport.collection.fleet/finalizer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "snapshot" => Some(CollectionType::Snapshot),
            "techsupport" => Some(CollectionType::Techsupport),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job table key: at most one outstanding job per request and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub request_name: String,
    pub collection_type: CollectionType,
}

impl JobKey {
    pub fn new(request_name: &str, collection_type: CollectionType) -> Self {
        Self {
            request_name: request_name.to_string(),
            collection_type,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection_type, self.request_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_outstanding(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub request_name: String,
    pub collection_type: CollectionType,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Snapshot of the most recent job for a request, as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionResult {
    /// No job has ever run (or its bookkeeping was purged).
    Unavailable,
    InProgress,
    Collected,
    Failed(String),
}

impl From<&JobInfo> for CollectionResult {
    fn from(job: &JobInfo) -> Self {
        match job.status {
            JobStatus::Queued | JobStatus::Running => CollectionResult::InProgress,
            JobStatus::Completed => CollectionResult::Collected,
            JobStatus::Failed => CollectionResult::Failed(
                job.error_message
                    .clone()
                    .unwrap_or_else(|| "collection failed".to_string()),
            ),
        }
    }
}

/// Arguments handed to a collect function.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub job_id: String,
    pub request_name: String,
    pub collection_type: CollectionType,
}
