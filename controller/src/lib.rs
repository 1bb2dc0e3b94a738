//! Scheduled collection controller.
//!
//! Watches collection requests and the clusters they select, keeps a reverse
//! index from clusters to the requests consuming them, and dispatches cron
//! driven collection jobs to the [`collector`] worker pool.

pub mod clock;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod errors;
pub mod index;
pub mod matcher;
pub mod model;
pub mod predicates;
pub mod reconciler;
pub mod runtime;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigManager};
pub use dispatcher::{CollectorDispatcher, Dispatcher, JobFactory};
pub use errors::{ControllerError, ScheduleError, SelectorError, StoreError};
pub use index::ReverseIndex;
pub use matcher::{MemoryCatalog, TargetCatalog, TargetMatcher};
pub use model::{CollectionRequest, RequestKey, RequestSpec, Target, TargetKind, TargetReference};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use runtime::{Controller, EventRouter, WorkQueue};
pub use store::{MemoryStore, RequestStore, SqliteStore};
