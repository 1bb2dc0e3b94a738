//! Test configuration builder for writing config directories programmatically

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for a config directory with `main.toml` and catalog files
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_toml: String,
    catalogs: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_toml: "host = \"127.0.0.1\"\nport = 8096\n".to_string(),
            catalogs: Vec::new(),
        }
    }

    /// Replace the contents of `main.toml`
    pub fn with_main(mut self, toml: &str) -> Self {
        self.main_toml = toml.to_string();
        self
    }

    /// Add a catalog file `<name>.toml`
    pub fn with_catalog(mut self, name: &str, toml: &str) -> Self {
        self.catalogs.push((name.to_string(), toml.to_string()));
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), &self.main_toml).expect("Failed to write main.toml");
        for (name, toml) in &self.catalogs {
            fs::write(config_dir.join(format!("{}.toml", name)), toml)
                .expect("Failed to write catalog file");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Written config directory; removed on drop
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn dir(&self) -> String {
        self.config_dir.to_string_lossy().to_string()
    }
}
