// File: controller/src/main.rs
use anyhow::Result;
use collector::Collector;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use controller::config::ConfigManager;
use controller::constants::defaults;
use controller::dispatcher::{manifest_job_factory, CollectorDispatcher};
use controller::scheduler::ResyncScheduler;
use controller::web::{start_web_server, AppState};
use controller::{
    Clock, Controller, EventRouter, MemoryCatalog, Reconciler, RequestStore, ReverseIndex,
    SqliteStore, SystemClock, TargetMatcher, WorkQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("controller=info".parse()?)
        .add_directive("collector=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting scheduled collection controller");

    let config_dir = std::env::var("CONTROLLER_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();

    let store: Arc<dyn RequestStore> = Arc::new(SqliteStore::new(&config.database_path).await?);
    let catalog = Arc::new(MemoryCatalog::with_targets(config.targets.clone()));
    info!("Cluster catalog initialized with {} clusters", config.targets.len());

    let collector = Arc::new(Collector::new(config.collector_workers));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let index = Arc::new(ReverseIndex::new());
    let queue = WorkQueue::new();

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        TargetMatcher::new(catalog.clone()),
        index.clone(),
        Arc::new(CollectorDispatcher::new(collector.clone())),
        manifest_job_factory(),
        clock.clone(),
    ));
    let controller = Arc::new(Controller::new(reconciler, queue.clone()));
    controller.enqueue_all(store.as_ref()).await?;

    let controller_clone = controller.clone();
    let workers = config.max_concurrent_reconciles;
    let controller_task = tokio::spawn(async move {
        controller_clone.run(workers).await;
    });

    let _resync = match &config.resync_schedule {
        Some(schedule) => {
            let resync = ResyncScheduler::new(store.clone(), queue.clone()).await?;
            resync.start(schedule).await?;
            Some(resync)
        }
        None => {
            info!("No resync_schedule configured, relying on requeue timers");
            None
        }
    };

    // Forget finished collector jobs past retention
    let collector_clone = collector.clone();
    let retention_hours = config.job_retention_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            defaults::CLEANUP_INTERVAL_SECONDS,
        ));
        loop {
            interval.tick().await;
            let removed = collector_clone.cleanup_old_jobs(retention_hours).await;
            if removed > 0 {
                info!("Cleaned up {} finished collector jobs", removed);
            }
        }
    });

    let router = EventRouter::new(index.clone(), queue.clone());
    let state = AppState {
        config: config.clone(),
        store,
        catalog,
        index,
        collector,
        router,
        queue: queue.clone(),
        clock,
    };

    let shutdown_queue = queue.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        shutdown_queue.shutdown();
    };

    start_web_server(state, shutdown).await?;

    if let Err(e) = controller_task.await {
        warn!("Controller task ended abnormally: {}", e);
    }
    info!("Controller stopped");
    Ok(())
}
