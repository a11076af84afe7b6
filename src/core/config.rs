use crate::core::dirs::get_config_directory;
use crate::core::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What to report when content differs but the org gave no timestamp to compare
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// Report the difference with an unknown direction
    #[default]
    FlagUnknown,
    /// Treat the local file as the modified side
    AssumeLocal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureToggles {
    pub content_compare: bool,
    pub coverage: bool,
    pub prefetch: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            content_compare: true,
            coverage: true,
            prefetch: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub cli_binary: String,
    pub target_org: Option<String>,
    pub metadata_ttl_secs: u64,
    pub diff_ttl_secs: u64,
    pub connection_ttl_secs: u64,
    pub coverage_ttl_secs: u64,
    pub recently_modified_hours: u64,
    pub metadata_batch_size: usize,
    pub compare_batch_size: usize,
    /// Upper bound on comparison retrievals running at the same time
    pub compare_concurrency: usize,
    pub batch_delay_ms: u64,
    pub status_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub retrieve_timeout_secs: u64,
    pub direction_policy: DirectionPolicy,
    pub features: FeatureToggles,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cli_binary: "sf".to_string(),
            target_org: None,
            metadata_ttl_secs: 60,
            diff_ttl_secs: 60,
            connection_ttl_secs: 60,
            coverage_ttl_secs: 300,
            recently_modified_hours: 24,
            metadata_batch_size: 50,
            compare_batch_size: 10,
            compare_concurrency: 2,
            batch_delay_ms: 50,
            status_timeout_secs: 10,
            query_timeout_secs: 30,
            retrieve_timeout_secs: 120,
            direction_policy: DirectionPolicy::default(),
            features: FeatureToggles::default(),
        }
    }
}

impl TrackerConfig {
    /// Load `config.json` from the config directory, writing defaults on first use
    pub fn load_or_create() -> Result<Self> {
        let config_dir = get_config_directory()?;
        Self::load_or_create_in(&config_dir)
    }

    pub fn load_or_create_in(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_in(config_dir)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = get_config_directory()?;
        self.save_in(&config_dir)
    }

    pub fn save_in(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| SyncError::directory_creation_failed(config_dir, e))?;

        let config_file = config_dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_file, content)?;

        Ok(())
    }

    pub fn metadata_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.metadata_ttl_secs as i64)
    }

    pub fn diff_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.diff_ttl_secs as i64)
    }

    pub fn connection_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.connection_ttl_secs as i64)
    }

    pub fn coverage_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.coverage_ttl_secs as i64)
    }

    pub fn recently_modified_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recently_modified_hours as i64)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieve_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}
