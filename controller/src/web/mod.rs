// File: controller/src/web/mod.rs
pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use collector::Collector;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::index::ReverseIndex;
use crate::matcher::MemoryCatalog;
use crate::model::RequestKey;
use crate::runtime::{EventRouter, WorkQueue};
use crate::store::RequestStore;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RequestStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub index: Arc<ReverseIndex>,
    pub collector: Arc<Collector>,
    pub router: EventRouter,
    pub queue: WorkQueue<RequestKey>,
    pub clock: Arc<dyn Clock>,
}
