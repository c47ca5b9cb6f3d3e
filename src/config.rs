//! Runtime settings for the grader.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty or missing file yields a working configuration.
//!
//! ```yaml
//! connect_timeout_secs: 5
//! http_timeout_secs: 5
//! worker_pool_size: 2
//! leaderboard_min_percentage: 70.0
//! database_path: "ukk_grader.sqlite"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DATABASE_PATH_ENV: &str = "UKK_GRADER_DB";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_WORKER_POOL_SIZE: usize = 2;
const DEFAULT_LEADERBOARD_MIN_PERCENTAGE: f64 = 70.0;
const DEFAULT_DATABASE_FILE: &str = "ukk_grader.sqlite";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraderConfig {
    pub connect_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub worker_pool_size: usize,
    pub leaderboard_min_percentage: f64,
    pub database_path: PathBuf,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            leaderboard_min_percentage: DEFAULT_LEADERBOARD_MIN_PERCENTAGE,
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
        }
    }
}

impl GraderConfig {
    /// Loads `path` when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(value) = std::env::var(DATABASE_PATH_ENV) {
            if !value.trim().is_empty() {
                config.database_path = PathBuf::from(value.trim());
            }
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            format!("Failed to read config file `{}`: {error}", path.display())
        })?;
        Self::from_yaml(&content)
            .map_err(|error| format!("Invalid config file `{}`: {error}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|error| error.to_string())?;
        if config.worker_pool_size == 0 {
            return Err("worker_pool_size must be at least 1".to_string());
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn is_leaderboard_eligible(&self, percentage: f64) -> bool {
        percentage >= self.leaderboard_min_percentage
    }
}

#[cfg(test)]
mod tests {
    use super::GraderConfig;

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let config = GraderConfig::from_yaml("worker_pool_size: 4\n").unwrap();
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.leaderboard_min_percentage, 70.0);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(GraderConfig::from_yaml("worker_pool_size: 0\n").is_err());
    }

    #[test]
    fn leaderboard_threshold_is_inclusive() {
        let config = GraderConfig::default();
        assert!(config.is_leaderboard_eligible(70.0));
        assert!(!config.is_leaderboard_eligible(69.99));
    }
}
