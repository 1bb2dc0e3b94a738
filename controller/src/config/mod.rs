// File: controller/src/config/mod.rs
pub mod manager;
pub use manager::ConfigManager;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::defaults;
use crate::model::{Target, TargetKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_collector_workers")]
    pub collector_workers: usize,
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,
    /// 6-field cron (sec min hour day month dow) for the periodic resync.
    pub resync_schedule: Option<String>,
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: i64,
    // Populated from the catalog files next to main.toml
    #[serde(skip)]
    pub targets: Vec<Target>,
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_collector_workers() -> usize {
    defaults::COLLECTOR_WORKERS
}

fn default_max_concurrent_reconciles() -> usize {
    defaults::MAX_CONCURRENT_RECONCILES
}

fn default_job_retention_hours() -> i64 {
    defaults::JOB_RETENTION_HOURS
}

fn default_ready() -> bool {
    true
}

/// A catalog file listing remote clusters.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    pub namespace: Option<String>,
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default = "default_ready")]
    pub ready: bool,
}

impl ClusterEntry {
    pub fn into_target(self, default_namespace: &str) -> Target {
        let namespace = self
            .namespace
            .unwrap_or_else(|| default_namespace.to_string());
        let mut target = Target::new(self.kind, &namespace, &self.name);
        target.labels = self.labels;
        target.paused = self.paused;
        target.ready = self.ready;
        target
    }
}
