// File: controller/src/scheduler/resync.rs
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument};

use crate::model::RequestKey;
use crate::runtime::WorkQueue;
use crate::store::RequestStore;

/// Periodically re-enqueues every stored request so that schedules keep
/// advancing even when no watch event arrives.
pub struct ResyncScheduler {
    store: Arc<dyn RequestStore>,
    queue: WorkQueue<RequestKey>,
    scheduler: JobScheduler,
}

impl ResyncScheduler {
    pub async fn new(store: Arc<dyn RequestStore>, queue: WorkQueue<RequestKey>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            store,
            queue,
            scheduler,
        })
    }

    /// Registers the resync job and starts the scheduler.
    ///
    /// `schedule` uses the 6-field format (sec min hour day month dow).
    #[instrument(skip(self))]
    pub async fn start(&self, schedule: &str) -> Result<()> {
        validate_6_field_cron(schedule)?;

        let store = self.store.clone();
        let queue = self.queue.clone();

        let job = Job::new_async(schedule, move |_uuid, _scheduler| {
            let store = store.clone();
            let queue = queue.clone();

            Box::pin(async move {
                match store.list().await {
                    Ok(requests) => {
                        let keys: Vec<RequestKey> =
                            requests.iter().filter_map(|r| r.key().ok()).collect();
                        info!("Resync enqueuing {} collection requests", keys.len());
                        for key in keys {
                            queue.add(key);
                        }
                    }
                    Err(e) => error!("Resync failed to list collection requests: {}", e),
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create resync job for '{}': {}", schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add resync job to scheduler: {}", e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start resync scheduler: {}", e))?;

        info!("✓ Resync scheduler started: {}", schedule);
        Ok(())
    }
}

fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let fields = schedule.split_whitespace().count();
    if fields != 6 {
        return Err(anyhow!(
            "resync schedule requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields: '{}'",
            fields,
            schedule
        ));
    }
    Ok(())
}
