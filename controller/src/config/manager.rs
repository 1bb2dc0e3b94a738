// File: controller/src/config/manager.rs
use super::{CatalogFile, Config};
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        let pattern = format!("{}/*.toml", config_dir);
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" {
                continue;
            }

            let catalog_name = filename
                .strip_suffix(".toml")
                .ok_or_else(|| anyhow!("Invalid config filename: {}", filename))?;

            debug!("Loading cluster catalog: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let catalog: CatalogFile = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            for entry in catalog.clusters {
                let target = entry.into_target(catalog_name);
                if !seen.insert(target.reference()) {
                    return Err(anyhow!(
                        "Duplicate cluster {} in {}",
                        target.reference(),
                        path.display()
                    ));
                }
                targets.push(target);
            }
        }

        config.targets = targets;
        Self::validate(&config)?;

        info!(
            "Loaded configuration: {} clusters, {} collector workers, {} reconcile workers",
            config.targets.len(),
            config.collector_workers,
            config.max_concurrent_reconciles
        );

        Ok(config)
    }

    fn validate(config: &Config) -> Result<()> {
        if config.collector_workers == 0 {
            return Err(anyhow!("collector_workers must be at least 1"));
        }
        if config.max_concurrent_reconciles == 0 {
            return Err(anyhow!("max_concurrent_reconciles must be at least 1"));
        }
        if config.job_retention_hours <= 0 {
            return Err(anyhow!("job_retention_hours must be positive"));
        }
        if let Some(schedule) = &config.resync_schedule {
            let fields = schedule.split_whitespace().count();
            if fields != 6 {
                return Err(anyhow!(
                    "resync_schedule requires 6 fields (sec min hour day month dow), got {}: '{}'",
                    fields,
                    schedule
                ));
            }
        }
        Ok(())
    }
}
