//! Error types for the collection controller
//!
//! Errors are grouped by concern. [`ControllerError::is_transient`] tells the
//! runtime whether a failed reconciliation is retried after the fixed requeue
//! delay or with exponential backoff.

use thiserror::Error;

use crate::model::RequestKey;

/// Main error type returned by a reconciliation
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Selector error: {0}")]
    Selector(#[from] SelectorError),

    #[error("Invalid object key: {0}")]
    Key(#[from] KeyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Collector error: {0}")]
    Collector(#[from] collector::CollectorError),

    #[error("Target catalog error: {0}")]
    Catalog(String),
}

impl ControllerError {
    /// Infrastructure failures that a plain retry is expected to resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::Store(e) => e.is_transient(),
            ControllerError::Catalog(_) => true,
            ControllerError::Schedule(_)
            | ControllerError::Selector(_)
            | ControllerError::Key(_)
            | ControllerError::Collector(_) => false,
        }
    }
}

/// Cron evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("unparseable schedule {schedule:?}: {reason}")]
    Unparseable { schedule: String, reason: String },

    #[error(
        "too many missed start times (> {max}). Set or decrease startingDeadlineSeconds or check clock skew"
    )]
    TooManyMissedStarts { max: u32 },

    #[error("schedule {schedule:?} has no occurrence after {after}")]
    NoNextOccurrence { schedule: String, after: String },
}

/// Label selector validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("operator {operator} on key {key:?} {reason}")]
    InvalidRequirement {
        key: String,
        operator: String,
        reason: String,
    },

    #[error("cannot parse selector {input:?}: {reason}")]
    Parse { input: String, reason: String },
}

/// Failures constructing an index key from an object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,

    #[error("object {name:?} has no namespace")]
    MissingNamespace { name: String },

    #[error("{field} {value:?} is not a DNS-1123 label")]
    InvalidName { field: &'static str, value: String },
}

/// Object store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{key} not found")]
    NotFound { key: RequestKey },

    #[error("{key} already exists")]
    AlreadyExists { key: RequestKey },

    #[error("conflict updating {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: RequestKey,
        expected: u64,
        actual: u64,
    },

    #[error("invalid object: {0}")]
    InvalidObject(#[from] KeyError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Database(_))
    }
}
