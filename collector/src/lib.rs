//! Asynchronous worker pool that gathers collection artifacts
//!
//! The pool owns its job table entirely; callers interact only through
//! [`Collector::collect`], [`Collector::get_result`] and
//! [`Collector::cleanup_entries`].

pub mod collectors;
pub mod job_manager;
pub mod pool;
pub mod types;

pub use collectors::{manifest_collector, request_dir};
pub use job_manager::JobManager;
pub use pool::{CollectFn, Collector};
pub use types::{CollectContext, CollectionResult, CollectionType, JobInfo, JobKey, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector is shut down")]
    Shutdown,

    #[error("failed to remove artifacts at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
