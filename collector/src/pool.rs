//! Bounded worker pool executing collection jobs
//!
//! Jobs are queued on a single channel drained by a fixed number of workers.
//! The pool guarantees at most one outstanding job per (request, type): a
//! resubmission while a job is queued or running is a no-op.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::collectors::request_dir;
use crate::job_manager::JobManager;
use crate::types::{CollectContext, CollectionResult, CollectionType, JobInfo, JobKey};
use crate::CollectorError;

/// Performs the actual collection. The returned result becomes the job's
/// terminal status in the result table.
pub type CollectFn =
    Arc<dyn Fn(CollectContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct QueuedJob {
    key: JobKey,
    job_id: String,
    collect: CollectFn,
}

/// A running job. `stopped` fires once its task has been awaited by the worker.
struct Running {
    job_id: String,
    abort: AbortHandle,
    stopped: oneshot::Receiver<()>,
}

type InFlight = Arc<Mutex<HashMap<JobKey, Running>>>;

pub struct Collector {
    jobs: JobManager,
    sender: mpsc::UnboundedSender<QueuedJob>,
    in_flight: InFlight,
    workers: usize,
}

impl Collector {
    /// Starts `workers` worker tasks. Must be called inside a tokio runtime.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<QueuedJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        let jobs = JobManager::new();
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));

        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let jobs = jobs.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                run_worker(worker_id, receiver, jobs, in_flight).await;
            });
        }

        info!("Collector started with {} workers", workers);
        Self {
            jobs,
            sender,
            in_flight,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Queues a collection job. Returns `false` when one is already outstanding.
    pub async fn collect(
        &self,
        request_name: &str,
        collection_type: CollectionType,
        collect: CollectFn,
    ) -> Result<bool, CollectorError> {
        let key = JobKey::new(request_name, collection_type);

        let Some(job_id) = self.jobs.try_enqueue(&key).await else {
            debug!("Job for {} already outstanding, ignoring submission", key);
            return Ok(false);
        };

        let queued = QueuedJob {
            key: key.clone(),
            job_id: job_id.clone(),
            collect,
        };
        if self.sender.send(queued).is_err() {
            self.jobs
                .fail_job(&key, &job_id, "collector is shut down".to_string())
                .await;
            return Err(CollectorError::Shutdown);
        }

        Ok(true)
    }

    /// Non-blocking view of the most recent job for the request.
    pub async fn get_result(
        &self,
        request_name: &str,
        collection_type: CollectionType,
    ) -> CollectionResult {
        let key = JobKey::new(request_name, collection_type);
        match self.jobs.get_job(&key).await {
            Some(job) => CollectionResult::from(&job),
            None => CollectionResult::Unavailable,
        }
    }

    /// Forgets queued and historical jobs of a request, cancels a running one
    /// and removes its artifact directory. Safe when nothing was ever queued.
    ///
    /// A cancelled job is waited for before its artifacts are removed.
    pub async fn cleanup_entries(
        &self,
        storage: &Path,
        request_name: &str,
        collection_type: CollectionType,
    ) -> Result<(), CollectorError> {
        let key = JobKey::new(request_name, collection_type);

        if let Some(job) = self.jobs.remove_job(&key).await {
            info!("Removed job {} ({:?}) for {}", job.job_id, job.status, key);
        }

        let running = self.in_flight.lock().await.remove(&key);
        if let Some(running) = running {
            warn!("Aborting in-flight job {} for {}", running.job_id, key);
            running.abort.abort();
            // Err means the worker is gone, so the task is not running either.
            let _ = running.stopped.await;
            debug!("In-flight job {} for {} stopped", running.job_id, key);
        }

        let dir = request_dir(storage, collection_type, request_name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Removed artifacts in {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CollectorError::Io {
                path: dir.display().to_string(),
                source: e,
            }),
        }
    }

    pub async fn cleanup_old_jobs(&self, max_hours: i64) -> u32 {
        self.jobs.cleanup_old_jobs(max_hours).await
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.list_jobs().await
    }

    pub async fn get_running_jobs(&self) -> Vec<JobInfo> {
        self.jobs.get_running_jobs().await
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    jobs: JobManager,
    in_flight: InFlight,
) {
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(job) = next else {
            debug!("Collector worker {} stopping", worker_id);
            return;
        };

        // Registration happens under the in-flight lock so a concurrent purge
        // either skips this job or finds it registered.
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let task = {
            let mut running = in_flight.lock().await;
            if !jobs.mark_running(&job.key, &job.job_id).await {
                debug!("Skipping purged job {} for {}", job.job_id, job.key);
                continue;
            }

            let context = CollectContext {
                job_id: job.job_id.clone(),
                request_name: job.key.request_name.clone(),
                collection_type: job.key.collection_type,
            };
            let task = tokio::spawn((job.collect)(context));
            running.insert(
                job.key.clone(),
                Running {
                    job_id: job.job_id.clone(),
                    abort: task.abort_handle(),
                    stopped: stopped_rx,
                },
            );
            task
        };

        info!("Worker {} running job {} for {}", worker_id, job.job_id, job.key);
        let outcome = task.await;
        let _ = stopped_tx.send(());

        {
            let mut running = in_flight.lock().await;
            if running
                .get(&job.key)
                .is_some_and(|current| current.job_id == job.job_id)
            {
                running.remove(&job.key);
            }
        }

        match outcome {
            Ok(Ok(())) => jobs.complete_job(&job.key, &job.job_id).await,
            Ok(Err(e)) => jobs.fail_job(&job.key, &job.job_id, e.to_string()).await,
            Err(e) if e.is_cancelled() => {
                info!("Job {} for {} was cancelled", job.job_id, job.key);
            }
            Err(e) => {
                error!("Job {} for {} panicked: {}", job.job_id, job.key, e);
                jobs.fail_job(&job.key, &job.job_id, format!("collection panicked: {}", e))
                    .await;
            }
        }
    }
}
