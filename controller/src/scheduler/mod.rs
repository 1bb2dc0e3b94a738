//! Cron scheduling of collection runs
//!
//! This module decides when a collection request is next due and whether a
//! job should be dispatched right now:
//!
//! - [`next_run_after`] walks the cron expression forward from the last run
//!   (or creation time), honouring `startingDeadlineSeconds`, and refuses to
//!   catch up on more than [`MAX_MISSED_START_TIMES`] missed firings.
//! - [`should_dispatch`] gates dispatch on the previously recorded schedule
//!   and a debounce window that absorbs back-to-back reconciliations.
//! - [`schedule`] combines both and submits a job through a [`Dispatcher`].
//!
//! Schedules use the standard 5-field cron format (min hour day month dow),
//! evaluated in UTC.
//!
//! [`MAX_MISSED_START_TIMES`]: crate::constants::scheduling::MAX_MISSED_START_TIMES

pub mod resync;
pub use resync::ResyncScheduler;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use collector::{CollectFn, CollectionType};
use croner::Cron;
use tracing::{debug, info};

use crate::constants::scheduling::{DEBOUNCE_WINDOW_SECONDS, MAX_MISSED_START_TIMES};
use crate::dispatcher::Dispatcher;
use crate::errors::{ControllerError, ScheduleError};
use crate::model::{CollectionRequest, CollectionStatus};

/// Scheduling view of a collection request.
pub trait Collection {
    fn creation_timestamp(&self) -> DateTime<Utc>;

    fn schedule(&self) -> &str;

    fn starting_deadline_seconds(&self) -> Option<i64>;

    fn next_schedule_time(&self) -> Option<DateTime<Utc>>;

    fn set_next_schedule_time(&mut self, time: Option<DateTime<Utc>>);

    fn last_run_time(&self) -> Option<DateTime<Utc>>;

    fn set_last_run_time(&mut self, time: Option<DateTime<Utc>>);

    fn set_last_run_status(&mut self, status: CollectionStatus);

    fn set_failure_message(&mut self, message: String);
}

impl Collection for CollectionRequest {
    fn creation_timestamp(&self) -> DateTime<Utc> {
        self.metadata.creation_timestamp
    }

    fn schedule(&self) -> &str {
        &self.spec.schedule
    }

    fn starting_deadline_seconds(&self) -> Option<i64> {
        self.spec.starting_deadline_seconds
    }

    fn next_schedule_time(&self) -> Option<DateTime<Utc>> {
        self.status.next_schedule_time
    }

    fn set_next_schedule_time(&mut self, time: Option<DateTime<Utc>>) {
        self.status.next_schedule_time = time;
    }

    fn last_run_time(&self) -> Option<DateTime<Utc>> {
        self.status.last_run_time
    }

    fn set_last_run_time(&mut self, time: Option<DateTime<Utc>>) {
        self.status.last_run_time = time;
    }

    fn set_last_run_status(&mut self, status: CollectionStatus) {
        self.status.last_run_status = Some(status);
    }

    fn set_failure_message(&mut self, message: String) {
        self.status.failure_message = message;
    }
}

pub fn parse_schedule(schedule: &str) -> Result<Cron, ScheduleError> {
    Cron::new(schedule)
        .parse()
        .map_err(|e| ScheduleError::Unparseable {
            schedule: schedule.to_string(),
            reason: e.to_string(),
        })
}

/// First occurrence strictly after `after`.
fn next_occurrence(
    cron: &Cron,
    schedule: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    cron.find_next_occurrence(&after.trunc_subsecs(0), false)
        .map_err(|_| ScheduleError::NoNextOccurrence {
            schedule: schedule.to_string(),
            after: after.to_rfc3339(),
        })
}

/// Computes the next time `schedule` fires after `now`.
///
/// `baseline` is the last run time, or the creation time when the request
/// never ran. With a deadline set, runs older than `now - deadline_seconds`
/// are not caught up on.
pub fn next_run_after(
    schedule: &str,
    baseline: DateTime<Utc>,
    deadline_seconds: Option<i64>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let cron = parse_schedule(schedule)?;

    let mut earliest = baseline;
    if let Some(deadline) = deadline_seconds {
        let scheduling_deadline = now - Duration::seconds(deadline);
        if scheduling_deadline > earliest {
            earliest = scheduling_deadline;
        }
    }

    let mut missed = 0u32;
    let mut occurrence = next_occurrence(&cron, schedule, earliest)?;
    while occurrence < now {
        missed += 1;
        if missed > MAX_MISSED_START_TIMES {
            return Err(ScheduleError::TooManyMissedStarts {
                max: MAX_MISSED_START_TIMES,
            });
        }
        occurrence = next_occurrence(&cron, schedule, occurrence)?;
    }

    next_occurrence(&cron, schedule, now)
}

/// Whether a job is due at `now` given the recorded schedule and last run.
pub fn should_dispatch(
    next_schedule_time: DateTime<Utc>,
    last_run_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if now < next_schedule_time {
        debug!("Not due yet, next schedule is {}", next_schedule_time);
        return false;
    }

    if let Some(last_run) = last_run_time {
        let elapsed = now - last_run;
        if elapsed < Duration::seconds(DEBOUNCE_WINDOW_SECONDS) {
            debug!(
                "Last run was {}s ago, inside the {}s debounce window",
                elapsed.num_seconds(),
                DEBOUNCE_WINDOW_SECONDS
            );
            return false;
        }
    }

    true
}

/// Records the next schedule time and dispatches a job when one is due.
///
/// The first time a request is seen only its next schedule time is recorded.
/// Returns the freshly computed next run time.
pub async fn schedule<C, F>(
    collection: &mut C,
    dispatcher: &dyn Dispatcher,
    job_name: &str,
    collection_type: CollectionType,
    collect: F,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ControllerError>
where
    C: Collection + Send,
    F: FnOnce() -> CollectFn + Send,
{
    let baseline = collection
        .last_run_time()
        .unwrap_or_else(|| collection.creation_timestamp());
    let next_run = next_run_after(
        collection.schedule(),
        baseline,
        collection.starting_deadline_seconds(),
        now,
    )?;

    match collection.next_schedule_time() {
        None => {
            debug!("First schedule for {}: {}", job_name, next_run);
        }
        Some(previous) => {
            if should_dispatch(previous, collection.last_run_time(), now) {
                info!("Queuing {} collection job for {}", collection_type, job_name);
                dispatcher.submit(job_name, collection_type, collect()).await?;
                collection.set_last_run_time(Some(now));
            }
        }
    }

    collection.set_next_schedule_time(Some(next_run));
    Ok(next_run)
}
